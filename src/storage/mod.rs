pub mod models;
pub mod schema;
pub mod sql_store;

pub use models::{schema_columns, ColumnSpec, Measurement, MeasurementBatch, SensorDefinition};
pub use sql_store::{DryRunStore, MeasurementStore};
#[cfg(feature = "sqlite")]
pub use sql_store::SqliteStore;
