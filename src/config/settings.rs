use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::modbus::FunctionCode;
use crate::utils::error::ConfigError;

/// Poll interval used when nothing valid is configured.
pub const DEFAULT_INTERVAL_SECONDS: u64 = 10;

/// Environment variable overriding the poll interval, in whole seconds.
pub const INTERVAL_ENV: &str = "INTERVAL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub polling: PollingConfig,
    pub discovery: DiscoveryConfig,
    pub metadata: MetadataConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Fixed port; discovered at startup when absent.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: ParityConfig,
    pub stop_bits: u8,
    pub timeout_ms: u64,
    /// Pause between sending a request and reading the answer.
    pub turnaround_ms: u64,
    pub function_code: FunctionCode,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            data_bits: 8,
            parity: ParityConfig::None,
            stop_bits: 1,
            timeout_ms: 1000,
            turnaround_ms: 0,
            function_code: FunctionCode::ReadInputRegisters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            max_attempts: 3,
            retry_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub first_address: u8,
    pub last_address: u8,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            first_address: 1,
            last_address: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub csv_path: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            csv_path: "sensor_metadata.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// When false, statements are logged instead of executed.
    pub enabled: bool,
    pub path: String,
    pub table: String,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "data/modbus_data.db".to_string(),
            table: "modbus_data".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub print_values: bool,
    pub format: OutputFormat,
    /// Rendered output is also appended here when set.
    pub file: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            print_values: false,
            format: OutputFormat::Console,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config = toml::from_str(&content)?;
        if config.polling.interval_seconds == 0 {
            warn!(
                "Invalid interval 0 in {}. Using default {} seconds.",
                path.display(),
                DEFAULT_INTERVAL_SECONDS
            );
            config.polling.interval_seconds = DEFAULT_INTERVAL_SECONDS;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies the `INTERVAL` environment variable, if present.
    pub fn apply_env(&mut self) {
        let raw = std::env::var(INTERVAL_ENV).ok();
        self.apply_interval_override(raw.as_deref());
    }

    pub(crate) fn apply_interval_override(&mut self, raw: Option<&str>) {
        match raw {
            None => info!(
                "{} environment variable not found. Using {} seconds.",
                INTERVAL_ENV, self.polling.interval_seconds
            ),
            Some(raw) => {
                self.polling.interval_seconds = parse_interval(Some(raw));
                info!(
                    "Using {} environment variable: {} seconds.",
                    INTERVAL_ENV, self.polling.interval_seconds
                );
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.interval_seconds == 0 {
            return Err(ConfigError::Invalid("polling.interval_seconds must be at least 1".to_string()));
        }
        if self.polling.max_attempts == 0 {
            return Err(ConfigError::Invalid("polling.max_attempts must be at least 1".to_string()));
        }
        if self.discovery.first_address == 0 || self.discovery.first_address > self.discovery.last_address {
            return Err(ConfigError::Invalid(format!(
                "discovery range {}..={} is empty or includes broadcast address 0",
                self.discovery.first_address, self.discovery.last_address
            )));
        }
        if !matches!(self.serial.data_bits, 7 | 8) {
            return Err(ConfigError::Invalid(format!("unsupported data bits {}", self.serial.data_bits)));
        }
        if !matches!(self.serial.stop_bits, 1 | 2) {
            return Err(ConfigError::Invalid(format!("unsupported stop bits {}", self.serial.stop_bits)));
        }
        Ok(())
    }
}

/// Interval in seconds; absent, non-numeric or non-positive input falls back
/// to [`DEFAULT_INTERVAL_SECONDS`].
pub fn parse_interval(raw: Option<&str>) -> u64 {
    match raw.map(str::trim) {
        None => DEFAULT_INTERVAL_SECONDS,
        Some(text) => match text.parse::<i64>() {
            Ok(value) if value > 0 => value as u64,
            Ok(value) => {
                warn!("Invalid interval {}. Using default {} seconds.", value, DEFAULT_INTERVAL_SECONDS);
                DEFAULT_INTERVAL_SECONDS
            }
            Err(_) => {
                warn!("Invalid interval '{}'. Using default {} seconds.", text, DEFAULT_INTERVAL_SECONDS);
                DEFAULT_INTERVAL_SECONDS
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_field_setup() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.parity, ParityConfig::None);
        assert_eq!(config.serial.timeout_ms, 1000);
        assert_eq!(config.serial.function_code, FunctionCode::ReadInputRegisters);
        assert_eq!(config.polling.interval_seconds, 10);
        assert_eq!(config.polling.max_attempts, 3);
        assert_eq!(config.database.table, "modbus_data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn interval_parsing_falls_back_to_default() {
        assert_eq!(parse_interval(None), 10);
        assert_eq!(parse_interval(Some("30")), 30);
        assert_eq!(parse_interval(Some(" 5 ")), 5);
        assert_eq!(parse_interval(Some("abc")), 10);
        assert_eq!(parse_interval(Some("2.5")), 10);
        assert_eq!(parse_interval(Some("0")), 10);
        assert_eq!(parse_interval(Some("-3")), 10);
    }

    #[test]
    fn env_override_replaces_file_interval() {
        let mut config = Config::default();
        config.polling.interval_seconds = 60;

        config.apply_interval_override(None);
        assert_eq!(config.polling.interval_seconds, 60);

        config.apply_interval_override(Some("15"));
        assert_eq!(config.polling.interval_seconds, 15);

        config.apply_interval_override(Some("soon"));
        assert_eq!(config.polling.interval_seconds, 10);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyUSB0"
            function_code = 3

            [database]
            table = "plant_data"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.function_code, FunctionCode::ReadHoldingRegisters);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.database.table, "plant_data");
        assert_eq!(config.polling.interval_seconds, 10);
    }

    #[test]
    fn save_and_reload_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/logger.toml");
        let mut config = Config::default();
        config.output.format = OutputFormat::Json;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.output.format, OutputFormat::Json);
    }

    #[test]
    fn zero_interval_in_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.toml");
        std::fs::write(&path, "[polling]\ninterval_seconds = 0\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.polling.interval_seconds, DEFAULT_INTERVAL_SECONDS);
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = Config::default();
        config.polling.interval_seconds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = Config::default();
        config.polling.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
