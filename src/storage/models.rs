use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::modbus::RegisterSpan;

/// One physical measurement point, as described by the metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDefinition {
    /// Slave address on the bus.
    pub id: u8,
    /// Destination fields; every one receives the same computed value.
    pub output_names: Vec<String>,
    pub category: String,
    pub units: Vec<String>,
    pub formula: String,
    /// Column storage types, parallel to `output_names`.
    pub field_types: Vec<String>,
    pub signed: bool,
    pub register_span: RegisterSpan,
}

impl SensorDefinition {
    /// `(name, type)` pairs for schema creation.
    pub fn columns(&self) -> impl Iterator<Item = ColumnSpec> + '_ {
        self.output_names
            .iter()
            .zip(&self.field_types)
            .map(|(name, sql_type)| ColumnSpec {
                name: name.clone(),
                sql_type: sql_type.clone(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
}

/// Every column named by `definitions`, first declaration wins.
pub fn schema_columns(definitions: &[SensorDefinition]) -> Vec<ColumnSpec> {
    let mut columns: Vec<ColumnSpec> = Vec::new();
    for column in definitions.iter().flat_map(|d| d.columns()) {
        if !columns.iter().any(|c| c.name == column.name) {
            columns.push(column);
        }
    }
    columns
}

/// Result of one sensor for one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: u8,
    pub output_names: Vec<String>,
    pub category: String,
    pub units: Vec<String>,
    pub value: f64,
    pub field_types: Vec<String>,
}

impl Measurement {
    pub fn from_definition(definition: &SensorDefinition, value: f64) -> Self {
        Self {
            id: definition.id,
            output_names: definition.output_names.clone(),
            category: definition.category.clone(),
            units: definition.units.clone(),
            value,
            field_types: definition.field_types.clone(),
        }
    }

    /// `(name, unit, value)` for every fan-out output.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.output_names
            .iter()
            .zip(&self.units)
            .map(move |(name, unit)| (name.as_str(), unit.as_str(), self.value))
    }
}

/// All fields of one poll cycle, persisted as a single timestamped row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBatch {
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<(String, f64)>,
}

impl MeasurementBatch {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: Vec::new(),
        }
    }

    /// Flattens measurements into fields. A name produced twice keeps its
    /// first position and the last value.
    pub fn from_measurements(timestamp: DateTime<Utc>, measurements: &[Measurement]) -> Self {
        let mut batch = Self::new(timestamp);
        for measurement in measurements {
            for name in &measurement.output_names {
                batch.set(name, measurement.value);
            }
        }
        batch
    }

    pub fn set(&mut self, name: &str, value: f64) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
