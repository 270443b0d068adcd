pub mod error;

pub use error::{ConfigError, EvaluationError, ModbusError, OutputError, RegisterError, StorageError};
