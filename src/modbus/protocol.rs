//! Modbus RTU framing for register reads.

use serde::{Deserialize, Serialize};

use super::crc::crc16_modbus;
use crate::utils::error::ModbusError;

/// Set on the function byte of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Register read access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FunctionCode {
    ReadHoldingRegisters,
    ReadInputRegisters,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            other => Err(format!("unsupported read function code {}", other)),
        }
    }
}

impl From<FunctionCode> for u8 {
    fn from(value: FunctionCode) -> Self {
        value.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub slave_id: u8,
    pub function: FunctionCode,
    pub start_register: u16,
    pub quantity: u16,
}

impl ReadRequest {
    pub fn new(slave_id: u8, function: FunctionCode, start_register: u16, quantity: u16) -> Self {
        Self {
            slave_id,
            function,
            start_register,
            quantity,
        }
    }

    /// `[slave, fc, addr_hi, addr_lo, qty_hi, qty_lo, crc_lo, crc_hi]`
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![self.slave_id, self.function.code()];
        frame.extend_from_slice(&self.start_register.to_be_bytes());
        frame.extend_from_slice(&self.quantity.to_be_bytes());

        let crc = crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    /// Full length of a successful response frame.
    pub fn expected_response_len(&self) -> usize {
        5 + self.quantity as usize * 2
    }

    /// Checks a complete response frame and returns its registers in order.
    pub fn decode_response(&self, frame: &[u8]) -> Result<Vec<u16>, ModbusError> {
        if frame.len() < 5 {
            return Err(ModbusError::InvalidResponse(format!(
                "frame too short ({} bytes)",
                frame.len()
            )));
        }

        check_crc(frame)?;

        if frame[0] != self.slave_id {
            return Err(ModbusError::InvalidResponse(format!(
                "answer from slave {} while talking to {}",
                frame[0], self.slave_id
            )));
        }

        let function = frame[1];
        if function == self.function.code() | EXCEPTION_FLAG {
            return Err(ModbusError::Exception {
                function: self.function.code(),
                code: frame[2],
            });
        }
        if function != self.function.code() {
            return Err(ModbusError::InvalidResponse(format!(
                "unexpected function code 0x{:02X}",
                function
            )));
        }

        let byte_count = frame[2] as usize;
        if byte_count != self.quantity as usize * 2 || frame.len() != byte_count + 5 {
            return Err(ModbusError::InvalidResponse(format!(
                "byte count {} does not match {} requested register(s)",
                byte_count, self.quantity
            )));
        }

        Ok(frame[3..3 + byte_count]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }
}

fn check_crc(frame: &[u8]) -> Result<(), ModbusError> {
    let data_len = frame.len() - 2;
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    let expected = crc16_modbus(&frame[..data_len]);
    if received != expected {
        return Err(ModbusError::CrcError { expected, received });
    }
    Ok(())
}

/// Appends the CRC to a response body. Used to build frames for simulated slaves.
#[cfg(test)]
pub(crate) fn with_crc(mut body: Vec<u8>) -> Vec<u8> {
    let crc = crc16_modbus(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_read_input_request() {
        let request = ReadRequest::new(1, FunctionCode::ReadInputRegisters, 0x0001, 1);
        assert_eq!(request.encode(), vec![0x01, 0x04, 0x00, 0x01, 0x00, 0x01, 0x60, 0x0A]);
        assert_eq!(request.expected_response_len(), 7);
    }

    #[test]
    fn decodes_register_words() {
        let request = ReadRequest::new(5, FunctionCode::ReadInputRegisters, 0x0010, 2);
        let frame = with_crc(vec![0x05, 0x04, 0x04, 0x00, 0x01, 0x86, 0xA0]);
        assert_eq!(request.decode_response(&frame).unwrap(), vec![0x0001, 0x86A0]);
    }

    #[test]
    fn rejects_bad_crc() {
        let request = ReadRequest::new(5, FunctionCode::ReadInputRegisters, 0, 1);
        let mut frame = with_crc(vec![0x05, 0x04, 0x02, 0x00, 0xD7]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            request.decode_response(&frame),
            Err(ModbusError::CrcError { .. })
        ));
    }

    #[test]
    fn surfaces_exception_code() {
        let request = ReadRequest::new(5, FunctionCode::ReadInputRegisters, 0x0100, 1);
        let frame = with_crc(vec![0x05, 0x84, 0x02]);
        match request.decode_response(&frame) {
            Err(ModbusError::Exception { function, code }) => {
                assert_eq!(function, 0x04);
                assert_eq!(code, 0x02);
            }
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn rejects_answer_from_other_slave() {
        let request = ReadRequest::new(5, FunctionCode::ReadHoldingRegisters, 0, 1);
        let frame = with_crc(vec![0x06, 0x03, 0x02, 0x00, 0x01]);
        assert!(matches!(
            request.decode_response(&frame),
            Err(ModbusError::InvalidResponse(_))
        ));
    }

    #[test]
    fn function_code_from_config_value() {
        assert_eq!(FunctionCode::try_from(4).unwrap(), FunctionCode::ReadInputRegisters);
        assert_eq!(FunctionCode::try_from(3).unwrap(), FunctionCode::ReadHoldingRegisters);
        assert!(FunctionCode::try_from(6).is_err());
    }
}
