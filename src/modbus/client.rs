use async_trait::async_trait;
use log::{debug, error, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::protocol::{ReadRequest, EXCEPTION_FLAG};
use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::ModbusError;

/// One request/response transaction on the bus.
///
/// Implementations must not interleave transactions: the RS-485 line is
/// half-duplex and only one request may be outstanding at a time.
#[async_trait]
pub trait ModbusClientTrait: Send + Sync {
    async fn read_registers(&self, request: &ReadRequest) -> Result<Vec<u16>, ModbusError>;
}

pub struct ModbusClient {
    port_name: String,
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    turnaround: Duration,
}

impl ModbusClient {
    pub fn new(settings: &SerialConfig, port_name: &str) -> Result<Self, ModbusError> {
        info!("🔌 Connecting to Modbus RTU port: {}", port_name);
        info!(
            "⚙️  Configuration: {} baud, {} data bits, {:?} parity, {} stop bit(s), {} ms timeout",
            settings.baud_rate, settings.data_bits, settings.parity, settings.stop_bits, settings.timeout_ms
        );

        let port = open_port(settings, port_name).map_err(|e| {
            error!("❌ Failed to open serial port {}: {}", port_name, e);
            e
        })?;

        info!("✅ Modbus RTU connection established");
        Ok(Self {
            port_name: port_name.to_string(),
            port: Arc::new(Mutex::new(port)),
            turnaround: Duration::from_millis(settings.turnaround_ms),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

pub(crate) fn open_port(settings: &SerialConfig, port_name: &str) -> Result<Box<dyn SerialPort>, ModbusError> {
    let parity = match settings.parity {
        ParityConfig::None => serialport::Parity::None,
        ParityConfig::Even => serialport::Parity::Even,
        ParityConfig::Odd => serialport::Parity::Odd,
    };
    let data_bits = match settings.data_bits {
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    };
    let stop_bits = match settings.stop_bits {
        2 => serialport::StopBits::Two,
        _ => serialport::StopBits::One,
    };

    let port = serialport::new(port_name, settings.baud_rate)
        .timeout(Duration::from_millis(settings.timeout_ms))
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .open()?;
    Ok(port)
}

#[async_trait]
impl ModbusClientTrait for ModbusClient {
    async fn read_registers(&self, request: &ReadRequest) -> Result<Vec<u16>, ModbusError> {
        debug!(
            "📊 Reading {} register(s) from device {} at 0x{:04X} (fc 0x{:02X})",
            request.quantity,
            request.slave_id,
            request.start_register,
            request.function.code()
        );

        let mut port = self.port.lock().map_err(|_| ModbusError::LockError)?;

        // Stale bytes from an earlier timed-out answer would corrupt this frame.
        port.clear(ClearBuffer::All)?;

        transact(&mut **port, request, self.turnaround)
    }
}

/// Writes `request` and reads back exactly one answer frame.
pub(crate) fn transact<P: Read + Write + ?Sized>(
    port: &mut P,
    request: &ReadRequest,
    turnaround: Duration,
) -> Result<Vec<u16>, ModbusError> {
    let frame = request.encode();
    debug!("📤 Sending frame: {}", hex::encode(&frame));

    port.write_all(&frame)
        .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))?;
    port.flush()
        .map_err(|e| ModbusError::CommunicationError(format!("Flush failed: {}", e)))?;

    if !turnaround.is_zero() {
        thread::sleep(turnaround);
    }

    // slave, function, byte count (or exception code)
    let mut response = vec![0u8; 3];
    port.read_exact(&mut response)?;

    let remaining = if response[1] & EXCEPTION_FLAG != 0 {
        2
    } else {
        request.expected_response_len() - 3
    };
    let mut tail = vec![0u8; remaining];
    port.read_exact(&mut tail)?;
    response.extend_from_slice(&tail);

    debug!("📥 Received frame: {}", hex::encode(&response));
    request.decode_response(&response)
}
