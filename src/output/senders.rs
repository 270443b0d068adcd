use async_trait::async_trait;
use log::{debug, error};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::utils::error::OutputError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), OutputError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), OutputError> {
        println!("{}", data);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends each rendered cycle to a file.
pub struct FileSender {
    file_path: String,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
        }
    }

    fn file_error(&self, source: std::io::Error) -> OutputError {
        error!("❌ Failed to write to file {}: {}", self.file_path, source);
        OutputError::File {
            path: self.file_path.clone(),
            source,
        }
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), OutputError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await
            .map_err(|e| self.file_error(e))?;

        file.write_all(format!("{}\n", data).as_bytes())
            .await
            .map_err(|e| self.file_error(e))?;
        file.flush().await.map_err(|e| self.file_error(e))?;

        debug!("📝 Appended {} bytes to {}", data.len() + 1, self.file_path);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_sender_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.log");
        let sender = FileSender::new(&path);

        sender.send("first").await.unwrap();
        sender.send("second").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[tokio::test]
    async fn file_sender_reports_unwritable_path() {
        let sender = FileSender::new("/nonexistent-dir/values.log");
        assert!(matches!(
            sender.send("x").await,
            Err(OutputError::File { .. })
        ));
    }
}
