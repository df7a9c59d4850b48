//! Period-keyed storage backends for holders
//!
//! Two interchangeable implementations of [`PeriodStorage`]:
//! - [`MemoryStorage`]: arrays kept in a sorted map
//! - [`DiskStorage`]: one JSON file per period in a directory owned by the
//!   storage, decoded lazily on `get`
//!
//! Lookups are exact-key only; deciding which period to reuse for a request is
//! the job of the holder and its base-function policies.

mod disk;
mod memory;

pub use disk::{DiskStorage, SimulationDirectory, ENUM_TABLE_FILE};
pub use memory::MemoryStorage;

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arrays::Array;
use crate::periods::Period;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to encode or decode {}: {source}", .path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn codec(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Codec {
            path: path.into(),
            source,
        }
    }
}

/// Approximate footprint of a storage
///
/// Computed from one representative array, not a full sum: every array of a
/// variable has the same length and type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub nb_arrays: usize,
    pub total_nb_bytes: usize,
    pub cell_size: usize,
}

impl MemoryUsage {
    pub(crate) fn from_sample(nb_arrays: usize, sample: Option<&Array>) -> Self {
        match sample {
            Some(array) => Self {
                nb_arrays,
                total_nb_bytes: nb_arrays * array.nbytes(),
                cell_size: array.value_type().cell_size(),
            },
            None => Self::default(),
        }
    }
}

/// Storage contract shared by every backend
///
/// Implementations must be object safe and `Send` so that independent
/// simulations can run on separate threads.
pub trait PeriodStorage: Send + fmt::Debug {
    /// Array stored for exactly `period`; `Ok(None)` when absent
    fn get(&self, period: &Period) -> Result<Option<Array>, StorageError>;

    /// Store `value` for `period`, replacing any previous value for that key
    fn put(&mut self, value: Array, period: Period) -> Result<(), StorageError>;

    /// Remove everything (`None`) or every stored period contained by `period`
    ///
    /// Deleting a period that holds nothing is not an error.
    fn delete(&mut self, period: Option<&Period>) -> Result<(), StorageError>;

    /// Remove the array stored for exactly `period`, leaving sub-periods alone
    fn remove(&mut self, period: &Period) -> Result<(), StorageError>;

    /// Every period with a stored array
    fn known_periods(&self) -> BTreeSet<Period>;

    fn memory_usage(&self) -> MemoryUsage;

    /// All stored arrays, in chronological order of their periods
    fn entries(&self) -> Result<Vec<(Period, Array)>, StorageError> {
        let mut entries = Vec::new();
        for period in self.known_periods() {
            if let Some(array) = self.get(&period)? {
                entries.push((period, array));
            }
        }
        Ok(entries)
    }
}
