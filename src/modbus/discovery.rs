use log::{debug, info, warn};
use std::sync::Arc;

use super::client::{ModbusClient, ModbusClientTrait};
use super::instrument::Instrument;
use super::protocol::FunctionCode;
use crate::config::settings::{DiscoveryConfig, SerialConfig};
use crate::utils::error::ModbusError;

/// Returns the serial port the logger should bind to.
///
/// An explicitly configured port wins; otherwise every port the OS reports
/// is probed for a slave answering on the configured address range.
pub async fn resolve_port(serial: &SerialConfig, discovery: &DiscoveryConfig) -> Option<String> {
    if let Some(port) = serial.port.as_deref().filter(|p| !p.is_empty()) {
        info!("📌 Using configured serial port {}", port);
        return Some(port.to_string());
    }

    let candidates = list_ports();
    if candidates.is_empty() {
        warn!("⚠️  No serial ports found");
        return None;
    }

    scan_ports(&candidates, discovery, serial.function_code, |name| {
        let client: Arc<dyn ModbusClientTrait> = Arc::new(ModbusClient::new(serial, name)?);
        Ok(client)
    })
    .await
}

/// Names of the serial ports visible to the OS.
pub fn list_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => {
            info!("📡 Available ports:");
            for port in &ports {
                let description = match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb) => usb
                        .product
                        .clone()
                        .or_else(|| usb.manufacturer.clone())
                        .unwrap_or_else(|| "USB".to_string()),
                    serialport::SerialPortType::PciPort => "PCI".to_string(),
                    serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    serialport::SerialPortType::Unknown => "unknown".to_string(),
                };
                info!("   - {} ({})", port.port_name, description);
            }
            ports.into_iter().map(|p| p.port_name).collect()
        }
        Err(e) => {
            warn!("⚠️  Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

/// Probes `candidates` in order and returns the first port on which any
/// address in the discovery range answers a read of register 0.
pub async fn scan_ports<F>(
    candidates: &[String],
    discovery: &DiscoveryConfig,
    function: FunctionCode,
    open: F,
) -> Option<String>
where
    F: Fn(&str) -> Result<Arc<dyn ModbusClientTrait>, ModbusError>,
{
    for port in candidates {
        info!("🔍 Scanning {}...", port);
        let client = match open(port) {
            Ok(client) => client,
            Err(e) => {
                warn!("⚠️  Error scanning {}: {}", port, e);
                continue;
            }
        };

        for address in discovery.first_address..=discovery.last_address {
            let instrument = match Instrument::new(address, client.clone()) {
                Ok(instrument) => instrument,
                Err(e) => {
                    debug!("Skipping address {}: {}", address, e);
                    continue;
                }
            };
            match instrument.read_register(0x0000, function, false).await {
                Ok(_) => {
                    info!("✅ Modbus device {} found on port {}", address, port);
                    return Some(port.clone());
                }
                Err(e) => debug!("No answer from address {} on {}: {}", address, port, e),
            }
        }
    }

    warn!("❌ No Modbus device found on any port");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::protocol::ReadRequest;
    use async_trait::async_trait;

    /// Answers only for one slave address.
    struct SingleSlave(u8);

    #[async_trait]
    impl ModbusClientTrait for SingleSlave {
        async fn read_registers(&self, request: &ReadRequest) -> Result<Vec<u16>, ModbusError> {
            if request.slave_id == self.0 {
                Ok(vec![0; request.quantity as usize])
            } else {
                Err(ModbusError::Timeout)
            }
        }
    }

    fn range() -> DiscoveryConfig {
        DiscoveryConfig {
            first_address: 1,
            last_address: 15,
        }
    }

    #[tokio::test]
    async fn configured_port_skips_scan() {
        let serial = SerialConfig {
            port: Some("/dev/ttyUSB7".to_string()),
            ..SerialConfig::default()
        };
        assert_eq!(
            resolve_port(&serial, &range()).await.as_deref(),
            Some("/dev/ttyUSB7")
        );
    }

    #[tokio::test]
    async fn returns_first_port_with_a_responding_slave() {
        let candidates = vec![
            "/dev/ttyS0".to_string(),
            "/dev/ttyUSB0".to_string(),
            "/dev/ttyUSB1".to_string(),
        ];

        let found = scan_ports(&candidates, &range(), FunctionCode::ReadInputRegisters, |name| {
            match name {
                "/dev/ttyS0" => Err(ModbusError::ConnectionError("busy".to_string())),
                "/dev/ttyUSB0" => Ok(Arc::new(SingleSlave(99)) as Arc<dyn ModbusClientTrait>),
                _ => Ok(Arc::new(SingleSlave(12)) as Arc<dyn ModbusClientTrait>),
            }
        })
        .await;

        assert_eq!(found.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[tokio::test]
    async fn none_when_nothing_answers() {
        let candidates = vec!["/dev/ttyUSB0".to_string()];
        let found = scan_ports(&candidates, &range(), FunctionCode::ReadInputRegisters, |_| {
            Ok(Arc::new(SingleSlave(200)) as Arc<dyn ModbusClientTrait>)
        })
        .await;
        assert!(found.is_none());
    }
}
