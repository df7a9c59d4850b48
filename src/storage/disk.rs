//! On-disk period storage
//!
//! Layout of a storage directory:
//!
//! ```text
//! <simulation dir>/<variable>/2014-03.json     one file per stored period
//! <simulation dir>/<variable>/enum_table.json  labels of enumerated variables
//! ```
//!
//! Files hold raw values (enum arrays hold integer codes); the side table
//! restores labels on read.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::{MemoryUsage, PeriodStorage, StorageError};
use crate::arrays::{Array, EnumArray, EnumTable};
use crate::periods::Period;

/// Name of the side index holding an enumerated variable's labels
pub const ENUM_TABLE_FILE: &str = "enum_table.json";

const EXTENSION: &str = "json";

/// File representation of an array
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
enum StoredArray {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
    Date(Vec<NaiveDate>),
    Enum(Vec<u16>),
}

impl StoredArray {
    fn from_array(array: Array) -> Self {
        match array {
            Array::Float(v) => StoredArray::Float(v),
            Array::Int(v) => StoredArray::Int(v),
            Array::Bool(v) => StoredArray::Bool(v),
            Array::Date(v) => StoredArray::Date(v),
            Array::Enum(e) => StoredArray::Enum(e.codes),
        }
    }

    fn into_array(self, table: Option<&Arc<EnumTable>>) -> Array {
        match self {
            StoredArray::Float(v) => Array::Float(v),
            StoredArray::Int(v) => Array::Int(v),
            StoredArray::Bool(v) => Array::Bool(v),
            StoredArray::Date(v) => Array::Date(v),
            StoredArray::Enum(codes) => {
                Array::Enum(EnumArray::new(codes, table.cloned().unwrap_or_default()))
            }
        }
    }
}

/// Period storage backed by one file per period
///
/// The storage owns its directory: it is removed when the storage is dropped
/// unless `preserve` is set, and the parent directory is removed too when that
/// leaves it empty.
#[derive(Debug)]
pub struct DiskStorage {
    dir: PathBuf,
    preserve: bool,
    files: BTreeMap<Period, PathBuf>,
    enum_table: Option<Arc<EnumTable>>,
}

impl DiskStorage {
    /// Create (or reuse) `dir` as an empty-index storage
    pub fn create(dir: impl Into<PathBuf>, preserve: bool) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        Ok(Self {
            dir,
            preserve,
            files: BTreeMap::new(),
            enum_table: None,
        })
    }

    /// Open an existing directory and index the periods it already holds
    pub fn open(dir: impl Into<PathBuf>, preserve: bool) -> Result<Self, StorageError> {
        let mut storage = Self::create(dir, preserve)?;
        storage.restore()?;
        Ok(storage)
    }

    /// Labels used to decode enum codes when no side table is on disk
    pub fn with_enum_table(mut self, table: Option<Arc<EnumTable>>) -> Self {
        if self.enum_table.is_none() {
            self.enum_table = table;
        }
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn set_preserve(&mut self, preserve: bool) {
        self.preserve = preserve;
    }

    /// Rebuild the period index by scanning the directory
    ///
    /// Files whose stem is not a period string are skipped with a warning.
    pub fn restore(&mut self) -> Result<(), StorageError> {
        self.files.clear();

        let table_path = self.dir.join(ENUM_TABLE_FILE);
        if table_path.exists() {
            let table: EnumTable = read_json(&table_path)?;
            self.enum_table = Some(Arc::new(table));
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.file_name().and_then(|n| n.to_str()) == Some(ENUM_TABLE_FILE) {
                continue;
            }
            match stem.parse::<Period>() {
                Ok(period) => {
                    self.files.insert(period, path);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        debug!("Restored {} periods from {}", self.files.len(), self.dir.display());
        Ok(())
    }

    fn path_for(&self, period: &Period) -> PathBuf {
        self.dir.join(format!("{}.{}", period, EXTENSION))
    }

    fn write_enum_table(&mut self, table: &Arc<EnumTable>) -> Result<(), StorageError> {
        let known = self.enum_table.as_ref().map_or(false, |t| **t == **table);
        let path = self.dir.join(ENUM_TABLE_FILE);
        if known && path.exists() {
            return Ok(());
        }
        write_json(&path, table.as_ref())?;
        self.enum_table = Some(Arc::clone(table));
        Ok(())
    }

    fn remove_file(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}

impl PeriodStorage for DiskStorage {
    fn get(&self, period: &Period) -> Result<Option<Array>, StorageError> {
        let Some(path) = self.files.get(period) else {
            return Ok(None);
        };
        let stored: StoredArray = read_json(path)?;
        Ok(Some(stored.into_array(self.enum_table.as_ref())))
    }

    fn put(&mut self, value: Array, period: Period) -> Result<(), StorageError> {
        if let Array::Enum(e) = &value {
            let table = Arc::clone(&e.table);
            self.write_enum_table(&table)?;
        }
        let path = self.path_for(&period);
        write_json(&path, &StoredArray::from_array(value))?;
        self.files.insert(period, path);
        Ok(())
    }

    fn delete(&mut self, period: Option<&Period>) -> Result<(), StorageError> {
        let doomed: Vec<Period> = self
            .files
            .keys()
            .filter(|stored| period.map_or(true, |p| p.contains(stored)))
            .copied()
            .collect();

        for stored in doomed {
            if let Some(path) = self.files.remove(&stored) {
                Self::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn remove(&mut self, period: &Period) -> Result<(), StorageError> {
        match self.files.remove(period) {
            Some(path) => Self::remove_file(&path),
            None => Ok(()),
        }
    }

    fn known_periods(&self) -> BTreeSet<Period> {
        self.files.keys().copied().collect()
    }

    fn memory_usage(&self) -> MemoryUsage {
        let sample = self
            .files
            .keys()
            .next()
            .and_then(|period| self.get(period).ok().flatten());
        MemoryUsage::from_sample(self.files.len(), sample.as_ref())
    }
}

impl Drop for DiskStorage {
    fn drop(&mut self) {
        if self.preserve {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Unable to remove storage directory {}: {}", self.dir.display(), e);
            }
            return;
        }
        if let Some(parent) = self.dir.parent() {
            remove_if_empty(parent);
        }
    }
}

/// Root directory shared by the on-disk holders of one simulation
///
/// Created lazily by the simulation; removed at teardown unless preserved.
#[derive(Debug)]
pub struct SimulationDirectory {
    dir: Option<TempDir>,
    path: PathBuf,
    preserve: bool,
}

impl SimulationDirectory {
    /// Create a fresh uniquely-named directory under `base` (system temp dir
    /// when `None`)
    pub fn create(base: Option<&Path>, preserve: bool) -> Result<Self, StorageError> {
        let base = base.map_or_else(std::env::temp_dir, Path::to_path_buf);
        fs::create_dir_all(&base).map_err(|e| StorageError::io(&base, e))?;
        let dir = tempfile::Builder::new()
            .prefix("fiscal_engine_")
            .tempdir_in(&base)
            .map_err(|e| StorageError::io(&base, e))?;
        let path = dir.path().to_path_buf();
        info!("Created simulation storage directory {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            preserve,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn preserve(&self) -> bool {
        self.preserve
    }

    /// Directory for one variable's storage
    pub fn variable_dir(&self, variable: &str) -> PathBuf {
        self.path.join(variable)
    }
}

impl Drop for SimulationDirectory {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.preserve {
            #[allow(deprecated)]
            let kept = dir.into_path();
            info!("Preserved simulation storage directory {}", kept.display());
        } else {
            if let Err(e) = dir.close() {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Unable to remove {}: {}", self.path.display(), e);
                }
            }
            debug!("Removed simulation storage directory {}", self.path.display());
        }
    }
}

fn remove_if_empty(dir: &Path) {
    let is_empty = fs::read_dir(dir).map(|mut entries| entries.next().is_none());
    if let Ok(true) = is_empty {
        if fs::remove_dir(dir).is_ok() {
            debug!("Removed empty directory {}", dir.display());
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StorageError> {
    let file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| StorageError::codec(path, e))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let file = File::create(path).map_err(|e| StorageError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|e| StorageError::codec(path, e))?;
    writer.flush().map_err(|e| StorageError::io(path, e))
}
