//! Modbus RTU sensor logger
//!
//! Polls sensors on a shared serial bus, turns raw register values into
//! measurements through per-sensor formulas, and stores one timestamped row
//! per poll cycle.

pub mod cli;
pub mod config;
pub mod formula;
pub mod modbus;
pub mod output;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use formula::FormulaEvaluator;
pub use modbus::{ModbusClient, RegisterClient, RegisterReader};
pub use output::{ConsoleFormatter, DataFormatter, DataSender, JsonFormatter, OutputPipeline};
pub use services::{MeasurementCollector, Scheduler, SchedulerHandle};
pub use storage::{MeasurementBatch, MeasurementStore, SensorDefinition};
pub use utils::error::{ConfigError, EvaluationError, ModbusError, RegisterError, StorageError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
