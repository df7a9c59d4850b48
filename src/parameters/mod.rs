//! Legislative parameters as seen by formulas
//!
//! The engine only needs one thing from the legislation: the tree of values in
//! force at a given instant. [`ParameterProvider`] is that boundary;
//! [`Legislation`] memoizes snapshots per instant so that formulas asking for
//! the same date share one tree. [`ParameterHistory`] is a CSV-backed provider.

mod loader;

pub use loader::{load_parameters, load_parameters_from_reader, ParameterHistory};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::periods::Instant;

/// Tree of parameter values in force at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterNode {
    Value(f64),
    Node(BTreeMap<String, ParameterNode>),
}

impl Default for ParameterNode {
    fn default() -> Self {
        ParameterNode::Node(BTreeMap::new())
    }
}

impl ParameterNode {
    /// Sub-tree or leaf at a dotted path (`"taxes.income_tax_rate"`)
    pub fn get(&self, path: &str) -> Option<&ParameterNode> {
        path.split('.').try_fold(self, |node, key| match node {
            ParameterNode::Node(children) => children.get(key),
            ParameterNode::Value(_) => None,
        })
    }

    /// Leaf value at a dotted path
    pub fn value(&self, path: &str) -> Option<f64> {
        match self.get(path)? {
            ParameterNode::Value(v) => Some(*v),
            ParameterNode::Node(_) => None,
        }
    }

    /// Insert a leaf, creating intermediate nodes; a leaf in the way is replaced
    pub fn insert(&mut self, path: &str, value: f64) {
        let keys: Vec<&str> = path.split('.').collect();
        self.insert_keys(&keys, value);
    }

    fn insert_keys(&mut self, keys: &[&str], value: f64) {
        let Some((first, rest)) = keys.split_first() else {
            *self = ParameterNode::Value(value);
            return;
        };
        if let ParameterNode::Value(_) = self {
            *self = ParameterNode::default();
        }
        if let ParameterNode::Node(children) = self {
            children
                .entry(first.to_string())
                .or_default()
                .insert_keys(rest, value);
        }
    }
}

/// Source of legislation snapshots
pub trait ParameterProvider: Send + Sync + fmt::Debug {
    /// Parameter tree in force at `instant`
    fn legislation_at(&self, instant: Instant) -> ParameterNode;
}

/// Parameters in force at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    pub instant: Instant,
    pub root: ParameterNode,
}

impl ParameterSnapshot {
    /// Leaf value; missing parameters are an error for the calling formula
    pub fn value(&self, path: &str) -> EngineResult<f64> {
        self.root
            .value(path)
            .ok_or_else(|| EngineError::ParameterNotFound {
                path: path.to_string(),
                instant: self.instant,
            })
    }

    pub fn get(&self, path: &str) -> Option<&ParameterNode> {
        self.root.get(path)
    }
}

/// Shared, read-only view of the legislation with per-instant memoization
///
/// Snapshots are immutable once built; the memo is the only mutable state and
/// sits behind a mutex so baseline and reform simulations on different
/// threads can share one `Legislation`.
pub struct Legislation {
    provider: Arc<dyn ParameterProvider>,
    snapshots: Mutex<HashMap<Instant, Arc<ParameterSnapshot>>>,
}

impl Legislation {
    pub fn new(provider: Arc<dyn ParameterProvider>) -> Self {
        Self {
            provider,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Legislation without any parameter
    pub fn empty() -> Self {
        Self::new(Arc::new(ParameterHistory::default()))
    }

    /// Snapshot in force at `instant`
    pub fn at(&self, instant: Instant) -> Arc<ParameterSnapshot> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = snapshots.entry(instant).or_insert_with(|| {
            debug!("Building parameter snapshot at {}", instant);
            Arc::new(ParameterSnapshot {
                instant,
                root: self.provider.legislation_at(instant),
            })
        });
        Arc::clone(snapshot)
    }

    /// Shortcut for `at(instant).value(path)`
    pub fn value(&self, path: &str, instant: Instant) -> EngineResult<f64> {
        self.at(instant).value(path)
    }

    /// Number of memoized snapshots
    pub fn cached_snapshots(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for Legislation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Legislation")
            .field("provider", &self.provider)
            .field("cached_snapshots", &self.cached_snapshots())
            .finish()
    }
}
