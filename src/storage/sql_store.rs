use async_trait::async_trait;
use log::info;

use crate::storage::models::{ColumnSpec, MeasurementBatch};
use crate::storage::schema::{add_column_sql, create_table_sql, insert_sql};
use crate::utils::error::StorageError;

/// Destination for poll-cycle batches.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Creates the table and any missing columns. Never drops or alters
    /// existing columns, so calling it repeatedly is harmless.
    async fn ensure_schema(&self, columns: &[ColumnSpec]) -> Result<(), StorageError>;

    /// Writes one batch as one row.
    async fn insert_row(&self, batch: &MeasurementBatch) -> Result<(), StorageError>;

    fn destination(&self) -> String;
}

/// Logs the statements it would run instead of touching a database.
pub struct DryRunStore {
    table: String,
}

impl DryRunStore {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl MeasurementStore for DryRunStore {
    async fn ensure_schema(&self, columns: &[ColumnSpec]) -> Result<(), StorageError> {
        let create = create_table_sql(&self.table)?;
        info!("📝 Query: {}", create);
        for column in columns {
            let sql = add_column_sql(&self.table, column)?;
            info!("📝 Query: {}", sql);
        }
        Ok(())
    }

    async fn insert_row(&self, batch: &MeasurementBatch) -> Result<(), StorageError> {
        let sql = insert_sql(&self.table, batch)?;
        let values = batch
            .fields
            .iter()
            .map(|(_, v)| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "📝 Query: {} -- ['{}', {}]",
            sql,
            batch.timestamp.to_rfc3339(),
            values
        );
        Ok(())
    }

    fn destination(&self) -> String {
        format!("dry-run({})", self.table)
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use log::debug;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
    use sqlx::{ConnectOptions, Connection, Row};
    use std::path::Path;
    use std::time::Duration;

    use crate::config::settings::DatabaseConfig;

    /// SQLite-backed store. A connection is opened for each call and closed
    /// before returning; writes happen once per poll cycle, so pooling buys
    /// nothing.
    pub struct SqliteStore {
        config: DatabaseConfig,
    }

    impl SqliteStore {
        pub fn new(config: DatabaseConfig) -> Result<Self, StorageError> {
            create_table_sql(&config.table)?;
            Ok(Self { config })
        }

        async fn connect(&self) -> Result<SqliteConnection, StorageError> {
            if let Some(parent) = Path::new(&self.config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StorageError::Database(format!("Failed to create database directory: {}", e))
                    })?;
                }
            }

            let conn = SqliteConnectOptions::new()
                .filename(&self.config.path)
                .create_if_missing(true)
                .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))
                .connect()
                .await?;
            Ok(conn)
        }

        async fn existing_columns(&self, conn: &mut SqliteConnection) -> Result<Vec<String>, StorageError> {
            let rows = sqlx::query(&format!("PRAGMA table_info({})", self.config.table))
                .fetch_all(&mut *conn)
                .await?;
            rows.iter()
                .map(|row| row.try_get::<String, _>("name").map_err(StorageError::from))
                .collect()
        }
    }

    #[async_trait]
    impl MeasurementStore for SqliteStore {
        async fn ensure_schema(&self, columns: &[ColumnSpec]) -> Result<(), StorageError> {
            info!("🔧 Ensuring table '{}' in {}", self.config.table, self.config.path);
            let mut conn = self.connect().await?;

            sqlx::query(&create_table_sql(&self.config.table)?)
                .execute(&mut conn)
                .await?;

            let existing = self.existing_columns(&mut conn).await?;
            let mut added = 0;
            for column in columns {
                if existing.iter().any(|c| c.eq_ignore_ascii_case(&column.name)) {
                    continue;
                }
                let sql = add_column_sql(&self.config.table, column)?;
                debug!("Query: {}", sql);
                sqlx::query(&sql).execute(&mut conn).await?;
                added += 1;
            }

            conn.close().await?;
            info!("✅ Schema ready ({} column(s) added)", added);
            Ok(())
        }

        async fn insert_row(&self, batch: &MeasurementBatch) -> Result<(), StorageError> {
            let sql = insert_sql(&self.config.table, batch)?;
            debug!("Query: {}", sql);

            let mut conn = self.connect().await?;
            let mut query = sqlx::query(&sql).bind(batch.timestamp.to_rfc3339());
            for (_, value) in &batch.fields {
                query = query.bind(*value);
            }
            query.execute(&mut conn).await?;
            conn.close().await?;

            info!("💾 Stored {} field(s) in '{}'", batch.len(), self.config.table);
            Ok(())
        }

        fn destination(&self) -> String {
            format!("sqlite:{}#{}", self.config.path, self.config.table)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn dry_run_validates_identifiers() {
        let store = DryRunStore::new("modbus_data");
        let mut batch = MeasurementBatch::new(Utc::now());
        batch.set("ok_name", 1.0);
        assert!(store.insert_row(&batch).await.is_ok());

        batch.set("bad name", 2.0);
        assert!(matches!(
            store.insert_row(&batch).await,
            Err(StorageError::InvalidIdentifier(_))
        ));
    }

    #[tokio::test]
    async fn dry_run_validates_schema_columns() {
        // No logger is installed here, so every log call is filtered out.
        let store = DryRunStore::new("modbus_data");
        let bad = ColumnSpec {
            name: "temp c".to_string(),
            sql_type: "REAL".to_string(),
        };
        assert!(matches!(
            store.ensure_schema(&[bad]).await,
            Err(StorageError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            DryRunStore::new("bad table").ensure_schema(&[]).await,
            Err(StorageError::InvalidIdentifier(_))
        ));
    }
}
