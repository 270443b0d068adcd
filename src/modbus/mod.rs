pub mod client;
pub mod crc;
pub mod discovery;
pub mod instrument;
pub mod protocol;
pub mod register_client;

pub use client::{ModbusClient, ModbusClientTrait};
pub use crc::crc16_modbus;
pub use discovery::{list_ports, resolve_port, scan_ports};
pub use instrument::{Instrument, RegisterSpan};
pub use protocol::{FunctionCode, ReadRequest};
pub use register_client::{RegisterClient, RegisterReader, RetryPolicy};
