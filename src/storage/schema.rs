//! Identifier checks for the dynamically built schema and insert statements.
//!
//! Table and column names come from configuration, so they are validated
//! before they are spliced into SQL text.

use regex::Regex;
use std::sync::OnceLock;

use crate::storage::models::{ColumnSpec, MeasurementBatch};
use crate::utils::error::StorageError;

/// Column holding the capture timestamp of each row.
pub const TIME_COLUMN: &str = "time";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

fn type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_ (),]*$").expect("valid type regex"))
}

pub fn check_identifier(name: &str) -> Result<&str, StorageError> {
    if identifier_pattern().is_match(name) && !name.eq_ignore_ascii_case(TIME_COLUMN) {
        Ok(name)
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

pub fn check_table(name: &str) -> Result<&str, StorageError> {
    if identifier_pattern().is_match(name) {
        Ok(name)
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

pub fn check_column_type(sql_type: &str) -> Result<&str, StorageError> {
    let trimmed = sql_type.trim();
    if type_pattern().is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(StorageError::InvalidColumnType(sql_type.to_string()))
    }
}

pub fn create_table_sql(table: &str) -> Result<String, StorageError> {
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY NOT NULL)",
        check_table(table)?,
        TIME_COLUMN
    ))
}

pub fn add_column_sql(table: &str, column: &ColumnSpec) -> Result<String, StorageError> {
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        check_table(table)?,
        check_identifier(&column.name)?,
        check_column_type(&column.sql_type)?
    ))
}

/// `INSERT` with one `?` placeholder for the timestamp plus one per field.
pub fn insert_sql(table: &str, batch: &MeasurementBatch) -> Result<String, StorageError> {
    let mut columns = vec![TIME_COLUMN];
    for (name, _) in &batch.fields {
        columns.push(check_identifier(name)?);
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        check_table(table)?,
        columns.join(", "),
        placeholders
    ))
}
