//! Simulation configuration
//!
//! Every field has a default, so a JSON file only needs the settings it
//! changes:
//!
//! ```json
//! {
//!   "max_spiral_loops": 2,
//!   "storage": { "mode": "disk", "preserve": true }
//! }
//! ```

use std::collections::BTreeSet;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What to do when a variable keeps re-entering itself at other periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpiralFallback {
    /// Fail the calculation with a spiral error
    #[default]
    Fail,
    /// Use the default value for the re-entered request, without caching it,
    /// and forget every value computed during that calculation once it ends
    DefaultValue,
}

/// Where holders keep their arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    #[default]
    Memory,
    /// Every non-permanent variable is stored on disk
    Disk,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mode: StorageMode,

    /// Variables stored on disk even in memory mode
    pub on_disk_variables: BTreeSet<String>,

    /// Parent of the simulation directory (system temp dir when unset)
    pub base_dir: Option<PathBuf>,

    /// Keep the simulation directory after the simulation is dropped
    pub preserve: bool,
}

impl StorageConfig {
    pub fn is_on_disk(&self, variable: &str) -> bool {
        self.mode == StorageMode::Disk || self.on_disk_variables.contains(variable)
    }

    /// Whether any variable may end up on disk
    pub fn uses_disk(&self) -> bool {
        self.mode == StorageMode::Disk || !self.on_disk_variables.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Times a variable may be re-entered at other periods before the
    /// recursion is treated as a spiral
    pub max_spiral_loops: usize,

    pub spiral_fallback: SpiralFallback,

    pub storage: StorageConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_spiral_loops: 1,
            spiral_fallback: SpiralFallback::Fail,
            storage: StorageConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Fail fast on any spiral, everything in memory
    pub fn strict() -> Self {
        Self {
            max_spiral_loops: 0,
            ..Default::default()
        }
    }

    /// Tolerate short self-references and fall back to defaults past them
    pub fn lenient() -> Self {
        Self {
            max_spiral_loops: 2,
            spiral_fallback: SpiralFallback::DefaultValue,
            ..Default::default()
        }
    }

    /// Store every non-permanent variable in a directory under `base_dir`
    pub fn on_disk(base_dir: Option<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                mode: StorageMode::Disk,
                base_dir,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_max_spiral_loops(mut self, loops: usize) -> Self {
        self.max_spiral_loops = loops;
        self
    }

    pub fn with_spiral_fallback(mut self, fallback: SpiralFallback) -> Self {
        self.spiral_fallback = fallback;
        self
    }

    /// Keep the simulation directory after teardown
    pub fn preserving_storage(mut self) -> Self {
        self.storage.preserve = true;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let json = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Unable to read {}: {}", path.as_ref().display(), e))?;
        Self::from_json_str(&json)
    }
}
