pub mod formatters;
pub mod senders;

use chrono::{DateTime, Utc};
use log::error;

use crate::config::settings::{OutputConfig, OutputFormat};
use crate::storage::models::Measurement;

pub use formatters::{ConsoleFormatter, DataFormatter, JsonFormatter};
pub use senders::{ConsoleSender, DataSender, FileSender};

/// Renders each cycle's measurements once and hands the text to every sender.
pub struct OutputPipeline {
    formatter: Box<dyn DataFormatter>,
    senders: Vec<Box<dyn DataSender>>,
}

impl OutputPipeline {
    pub fn new(formatter: Box<dyn DataFormatter>) -> Self {
        Self {
            formatter,
            senders: Vec::new(),
        }
    }

    /// Console output plus the optional file, or `None` when printing is off.
    pub fn from_config(config: &OutputConfig) -> Option<Self> {
        if !config.print_values {
            return None;
        }
        let formatter: Box<dyn DataFormatter> = match config.format {
            OutputFormat::Console => Box::new(ConsoleFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
        };
        let mut pipeline = Self::new(formatter).with_sender(Box::new(ConsoleSender));
        if let Some(path) = &config.file {
            pipeline = pipeline.with_sender(Box::new(FileSender::new(path)));
        }
        Some(pipeline)
    }

    pub fn with_sender(mut self, sender: Box<dyn DataSender>) -> Self {
        self.senders.push(sender);
        self
    }

    /// Sender failures are logged; output never interrupts polling.
    pub async fn publish(&self, timestamp: DateTime<Utc>, measurements: &[Measurement]) {
        let rendered = self.formatter.format(timestamp, measurements);
        for sender in &self.senders {
            if let Err(e) = sender.send(&rendered).await {
                error!(
                    "❌ Failed to send data via {} to {}: {}",
                    sender.sender_type(),
                    sender.destination(),
                    e
                );
            }
        }
    }
}
