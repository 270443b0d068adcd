use thiserror::Error;

/// A single transaction against the bus failed.
#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("CRC checksum mismatch (expected 0x{expected:04X}, received 0x{received:04X})")]
    CrcError { expected: u16, received: u16 },

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("Device returned exception code 0x{code:02X} for function 0x{function:02X}")]
    Exception { function: u8, code: u8 },

    #[error("Invalid device address: {0} (must be 1-247)")]
    InvalidDevice(u8),

    #[error("Unsupported register span: {0} (must be 1 or 2)")]
    InvalidSpan(u8),

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Timeout occurred")]
    Timeout,
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => ModbusError::Timeout,
            _ => ModbusError::CommunicationError(format!("IO error: {}", err)),
        }
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::ConnectionError(err.to_string())
    }
}

/// Every attempt to read one register was exhausted.
#[derive(Error, Debug)]
#[error("reading register 0x{register:04X} from device {device_id} failed after {attempts} attempt(s): {source}")]
pub struct RegisterError {
    pub device_id: u8,
    pub register: u16,
    pub attempts: u32,
    #[source]
    pub source: ModbusError,
}

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error("invalid register address token '{token}'")]
    InvalidAddress { token: String },

    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid column type '{0}'")]
    InvalidColumnType(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("File write error ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Metadata row {row}: {message}")]
    Metadata { row: usize, message: String },

    #[error("Metadata CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_error_carries_device_and_register() {
        let err = RegisterError {
            device_id: 5,
            register: 0x0001,
            attempts: 3,
            source: ModbusError::Timeout,
        };
        let text = err.to_string();
        assert!(text.contains("device 5"));
        assert!(text.contains("0x0001"));
        assert!(text.contains("3 attempt"));
    }

    #[test]
    fn timed_out_io_maps_to_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "no answer");
        assert!(matches!(ModbusError::from(io), ModbusError::Timeout));
    }
}
