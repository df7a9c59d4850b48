//! In-memory period storage

use std::collections::{BTreeMap, BTreeSet};

use super::{MemoryUsage, PeriodStorage, StorageError};
use crate::arrays::Array;
use crate::periods::Period;

/// Arrays kept in memory, keyed by period
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    arrays: BTreeMap<Period, Array>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

impl PeriodStorage for MemoryStorage {
    fn get(&self, period: &Period) -> Result<Option<Array>, StorageError> {
        Ok(self.arrays.get(period).cloned())
    }

    fn put(&mut self, value: Array, period: Period) -> Result<(), StorageError> {
        self.arrays.insert(period, value);
        Ok(())
    }

    fn delete(&mut self, period: Option<&Period>) -> Result<(), StorageError> {
        match period {
            None => self.arrays.clear(),
            Some(period) => self.arrays.retain(|stored, _| !period.contains(stored)),
        }
        Ok(())
    }

    fn remove(&mut self, period: &Period) -> Result<(), StorageError> {
        self.arrays.remove(period);
        Ok(())
    }

    fn known_periods(&self) -> BTreeSet<Period> {
        self.arrays.keys().copied().collect()
    }

    fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage::from_sample(self.arrays.len(), self.arrays.values().next())
    }

    fn entries(&self) -> Result<Vec<(Period, Array)>, StorageError> {
        Ok(self
            .arrays
            .iter()
            .map(|(period, array)| (*period, array.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn test_put_get_exact_key_only() {
        let mut storage = MemoryStorage::new();
        storage.put(Array::Float(vec![1.0]), p("2014-03")).unwrap();

        assert_eq!(storage.get(&p("2014-03")).unwrap(), Some(Array::Float(vec![1.0])));
        assert_eq!(storage.get(&p("2014")).unwrap(), None);
        assert_eq!(storage.get(&p("2014-04")).unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let mut storage = MemoryStorage::new();
        storage.put(Array::Int(vec![1]), p("2014")).unwrap();
        storage.put(Array::Int(vec![2]), p("2014")).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(&p("2014")).unwrap(), Some(Array::Int(vec![2])));
    }

    #[test]
    fn test_delete_contained_periods() {
        let mut storage = MemoryStorage::new();
        for month in p("2020").sub_periods(crate::periods::DateUnit::Month) {
            storage.put(Array::Float(vec![1.0]), month).unwrap();
        }
        storage.put(Array::Float(vec![12.0]), p("2020")).unwrap();
        storage.put(Array::Float(vec![1.0]), p("2021-01")).unwrap();

        storage.delete(Some(&p("2020"))).unwrap();

        assert_eq!(storage.known_periods().into_iter().collect::<Vec<_>>(), vec![p("2021-01")]);

        // Idempotent
        storage.delete(Some(&p("2020"))).unwrap();
        storage.delete(None).unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_remove_leaves_sub_periods() {
        let mut storage = MemoryStorage::new();
        storage.put(Array::Float(vec![1.0]), p("2020-06")).unwrap();
        storage.put(Array::Float(vec![12.0]), p("2020")).unwrap();

        storage.remove(&p("2020")).unwrap();
        assert_eq!(storage.known_periods().into_iter().collect::<Vec<_>>(), vec![p("2020-06")]);
        storage.remove(&p("2020")).unwrap();
    }

    #[test]
    fn test_memory_usage() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.memory_usage().nb_arrays, 0);

        storage.put(Array::Float(vec![0.0; 4]), p("2014-01")).unwrap();
        storage.put(Array::Float(vec![0.0; 4]), p("2014-02")).unwrap();
        let usage = storage.memory_usage();
        assert_eq!(usage.nb_arrays, 2);
        assert_eq!(usage.total_nb_bytes, 64);
    }
}
