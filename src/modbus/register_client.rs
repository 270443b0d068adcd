use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use super::client::ModbusClientTrait;
use super::instrument::{Instrument, RegisterSpan};
use super::protocol::FunctionCode;
use crate::utils::error::RegisterError;

/// Source of raw register values, addressed by device and register.
#[async_trait]
pub trait RegisterReader: Send + Sync {
    async fn read_register(
        &self,
        device_id: u8,
        register: u16,
        function: FunctionCode,
        signed: bool,
        span: RegisterSpan,
    ) -> Result<i64, RegisterError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// Reads registers through one cached [`Instrument`] per device address.
///
/// Instruments are created on first use and kept for the life of the
/// client. The cache is never evicted; slave addresses are bounded by the
/// bus (1-247, in practice a handful), so it cannot grow without limit.
pub struct RegisterClient {
    client: Arc<dyn ModbusClientTrait>,
    instruments: Mutex<HashMap<u8, Instrument>>,
    policy: RetryPolicy,
}

impl RegisterClient {
    pub fn new(client: Arc<dyn ModbusClientTrait>, policy: RetryPolicy) -> Self {
        Self {
            client,
            instruments: Mutex::new(HashMap::new()),
            policy: RetryPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Device addresses that currently have a cached instrument, ascending.
    pub async fn cached_devices(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.instruments.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    async fn instrument(&self, device_id: u8) -> Result<Instrument, RegisterError> {
        let mut instruments = self.instruments.lock().await;
        if let Some(instrument) = instruments.get(&device_id) {
            return Ok(instrument.clone());
        }

        let instrument = Instrument::new(device_id, self.client.clone()).map_err(|source| RegisterError {
            device_id,
            register: 0,
            attempts: 0,
            source,
        })?;
        instruments.insert(device_id, instrument.clone());
        Ok(instrument)
    }
}

#[async_trait]
impl RegisterReader for RegisterClient {
    async fn read_register(
        &self,
        device_id: u8,
        register: u16,
        function: FunctionCode,
        signed: bool,
        span: RegisterSpan,
    ) -> Result<i64, RegisterError> {
        let instrument = self
            .instrument(device_id)
            .await
            .map_err(|e| RegisterError { register, ..e })?;

        let mut attempt = 1;
        loop {
            match instrument.read_value(register, function, signed, span).await {
                Ok(value) => {
                    debug!(
                        "📊 Device {} register 0x{:04X} = {} (attempt {})",
                        device_id, register, value, attempt
                    );
                    return Ok(value);
                }
                Err(source) => {
                    warn!(
                        "⚠️  Attempt {}/{} reading register 0x{:04X} from device {} failed: {}",
                        attempt, self.policy.max_attempts, register, device_id, source
                    );
                    if attempt >= self.policy.max_attempts {
                        return Err(RegisterError {
                            device_id,
                            register,
                            attempts: attempt,
                            source,
                        });
                    }
                }
            }

            attempt += 1;
            if !self.policy.delay.is_zero() {
                sleep(self.policy.delay).await;
            }
        }
    }
}
