//! Fiscal Engine - Period-aware formula resolution for tax-benefit microsimulation
//!
//! This library provides:
//! - Calendar periods (days, months, years, eternity) and their algebra
//! - Variable definitions with dated formulas and base-function policies
//! - Per-variable holders caching values by period, in memory or on disk
//! - Recursive resolution with cycle and spiral detection
//! - Baseline and reform scenarios run in parallel

pub mod arrays;
pub mod config;
pub mod demo;
pub mod error;
pub mod holders;
pub mod parameters;
pub mod periods;
pub mod scenario;
pub mod simulation;
pub mod storage;
pub mod system;
pub mod variables;

// Re-export commonly used types
pub use arrays::{Array, EnumArray, EnumTable, Value, ValueType};
pub use config::{SimulationConfig, SpiralFallback, StorageConfig, StorageMode};
pub use error::{EngineError, EngineResult};
pub use holders::Holder;
pub use parameters::{Legislation, ParameterHistory, ParameterNode, ParameterProvider};
pub use periods::{DateUnit, Instant, Period};
pub use scenario::{ScenarioResult, ScenarioRunner};
pub use simulation::{PopulationView, Simulation, SimulationBuilder};
pub use storage::{DiskStorage, MemoryStorage, PeriodStorage};
pub use system::{Entity, TaxBenefitSystem};
pub use variables::{BaseFunction, SetInputPolicy, Variable, VariableKind};
