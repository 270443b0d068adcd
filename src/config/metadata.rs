//! Sensor metadata CSV.
//!
//! Expected header: `ID,db-name,type,unit,value,data_type,signed,registers`.
//! `db-name`, `unit` and `data_type` hold comma-separated lists, so they are
//! quoted in the file:
//!
//! ```text
//! ID,db-name,type,unit,value,data_type,signed,registers
//! 5,"temp_c,temp_k",temperature,"C,K",0x0001 * 0.1,"REAL,REAL",True,1
//! ```

use log::info;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::modbus::RegisterSpan;
use crate::storage::models::SensorDefinition;
use crate::utils::error::ConfigError;

/// Supplies the sensor definitions polled every cycle.
pub trait MetadataSource: Send + Sync {
    fn load_definitions(&self) -> Result<Vec<SensorDefinition>, ConfigError>;
}

pub struct CsvMetadata {
    path: PathBuf,
}

impl CsvMetadata {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl MetadataSource for CsvMetadata {
    fn load_definitions(&self) -> Result<Vec<SensorDefinition>, ConfigError> {
        let file = std::fs::File::open(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let definitions = parse_definitions(file)?;
        info!(
            "📋 Loaded {} sensor definition(s) from {}",
            definitions.len(),
            self.path.display()
        );
        Ok(definitions)
    }
}

#[derive(Debug, Deserialize)]
struct MetadataRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "db-name")]
    db_name: String,
    #[serde(rename = "type")]
    category: String,
    unit: String,
    value: String,
    data_type: String,
    signed: String,
    registers: String,
}

/// Parses every row; the first malformed row fails the whole load.
pub fn parse_definitions<R: Read>(input: R) -> Result<Vec<SensorDefinition>, ConfigError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let headers = reader.headers()?.clone();

    let mut definitions = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row_number = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let row: MetadataRow = record
            .deserialize(Some(&headers))
            .map_err(|e| ConfigError::Metadata {
                row: row_number,
                message: e.to_string(),
            })?;
        definitions.push(row.into_definition(row_number)?);
    }
    Ok(definitions)
}

impl MetadataRow {
    fn into_definition(self, row: usize) -> Result<SensorDefinition, ConfigError> {
        let fail = |message: String| ConfigError::Metadata { row, message };

        let id = self
            .id
            .parse::<u8>()
            .map_err(|_| fail(format!("invalid ID '{}'", self.id)))?;
        let registers = self
            .registers
            .parse::<u8>()
            .map_err(|_| fail(format!("invalid registers '{}'", self.registers)))?;
        let register_span = RegisterSpan::try_from(registers).map_err(|e| fail(e.to_string()))?;

        let output_names = split_list(&self.db_name);
        let units = split_list(&self.unit);
        let field_types = split_list(&self.data_type);
        if output_names.is_empty() {
            return Err(fail("db-name is empty".to_string()));
        }
        if units.len() != output_names.len() || field_types.len() != output_names.len() {
            return Err(fail(format!(
                "{} db-name(s), {} unit(s) and {} data_type(s) must match",
                output_names.len(),
                units.len(),
                field_types.len()
            )));
        }
        if self.value.is_empty() {
            return Err(fail("value formula is empty".to_string()));
        }

        Ok(SensorDefinition {
            id,
            output_names,
            category: self.category,
            units,
            formula: self.value,
            field_types,
            signed: self.signed.eq_ignore_ascii_case("true"),
            register_span,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
