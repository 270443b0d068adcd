use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::client::ModbusClientTrait;
use super::protocol::{FunctionCode, ReadRequest};
use crate::utils::error::ModbusError;

/// Number of 16-bit registers composing one logical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RegisterSpan {
    Single,
    /// Two registers, high word first, merged into a 32-bit value.
    Double,
}

impl RegisterSpan {
    pub fn count(self) -> u16 {
        match self {
            RegisterSpan::Single => 1,
            RegisterSpan::Double => 2,
        }
    }
}

impl TryFrom<u8> for RegisterSpan {
    type Error = ModbusError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RegisterSpan::Single),
            2 => Ok(RegisterSpan::Double),
            other => Err(ModbusError::InvalidSpan(other)),
        }
    }
}

impl From<RegisterSpan> for u8 {
    fn from(value: RegisterSpan) -> Self {
        value.count() as u8
    }
}

/// Communication handle bound to one slave address on the shared bus.
#[derive(Clone)]
pub struct Instrument {
    device_id: u8,
    client: Arc<dyn ModbusClientTrait>,
}

impl Instrument {
    pub fn new(device_id: u8, client: Arc<dyn ModbusClientTrait>) -> Result<Self, ModbusError> {
        if !(1..=247).contains(&device_id) {
            return Err(ModbusError::InvalidDevice(device_id));
        }
        debug!("🔧 Created instrument for device {}", device_id);
        Ok(Self { device_id, client })
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Reads one 16-bit register.
    pub async fn read_register(
        &self,
        register: u16,
        function: FunctionCode,
        signed: bool,
    ) -> Result<i64, ModbusError> {
        let words = self.read_words(register, function, 1).await?;
        Ok(decode_single(words[0], signed))
    }

    /// Reads two consecutive registers as one 32-bit value.
    pub async fn read_long(
        &self,
        register: u16,
        function: FunctionCode,
        signed: bool,
    ) -> Result<i64, ModbusError> {
        let words = self.read_words(register, function, 2).await?;
        Ok(decode_long(words[0], words[1], signed))
    }

    pub async fn read_value(
        &self,
        register: u16,
        function: FunctionCode,
        signed: bool,
        span: RegisterSpan,
    ) -> Result<i64, ModbusError> {
        match span {
            RegisterSpan::Single => self.read_register(register, function, signed).await,
            RegisterSpan::Double => self.read_long(register, function, signed).await,
        }
    }

    async fn read_words(
        &self,
        register: u16,
        function: FunctionCode,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let request = ReadRequest::new(self.device_id, function, register, count);
        let words = self.client.read_registers(&request).await?;
        if words.len() != count as usize {
            return Err(ModbusError::InvalidResponse(format!(
                "expected {} register(s), got {}",
                count,
                words.len()
            )));
        }
        Ok(words)
    }
}

pub fn decode_single(word: u16, signed: bool) -> i64 {
    if signed {
        word as i16 as i64
    } else {
        word as i64
    }
}

pub fn decode_long(high: u16, low: u16, signed: bool) -> i64 {
    let raw = ((high as u32) << 16) | low as u32;
    if signed {
        raw as i32 as i64
    } else {
        raw as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedSlave {
        words: Vec<u16>,
        seen: Mutex<Vec<ReadRequest>>,
    }

    #[async_trait]
    impl ModbusClientTrait for FixedSlave {
        async fn read_registers(&self, request: &ReadRequest) -> Result<Vec<u16>, ModbusError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.words[..request.quantity as usize].to_vec())
        }
    }

    fn slave(words: Vec<u16>) -> Arc<FixedSlave> {
        Arc::new(FixedSlave {
            words,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn single_register_ranges() {
        assert_eq!(decode_single(0xFFFF, false), 65535);
        assert_eq!(decode_single(0xFFFF, true), -1);
        assert_eq!(decode_single(0x8000, true), i16::MIN as i64);
        assert_eq!(decode_single(0x7FFF, true), i16::MAX as i64);
    }

    #[test]
    fn long_register_ranges() {
        assert_eq!(decode_long(0x0001, 0x86A0, false), 100_000);
        assert_eq!(decode_long(0xFFFF, 0xFFFF, false), u32::MAX as i64);
        assert_eq!(decode_long(0xFFFF, 0xFFFE, true), -2);
        assert_eq!(decode_long(0x8000, 0x0000, true), i32::MIN as i64);
    }

    #[test]
    fn rejects_out_of_range_address() {
        let client: Arc<dyn ModbusClientTrait> = slave(vec![0]);
        assert!(matches!(
            Instrument::new(0, client.clone()),
            Err(ModbusError::InvalidDevice(0))
        ));
        assert!(Instrument::new(248, client).is_err());
    }

    #[tokio::test]
    async fn read_long_requests_two_registers() {
        let fake = slave(vec![0xFFFF, 0xFF38]);
        let instrument = Instrument::new(7, fake.clone()).unwrap();

        let value = instrument
            .read_value(0x0010, FunctionCode::ReadInputRegisters, true, RegisterSpan::Double)
            .await
            .unwrap();

        assert_eq!(value, -200);
        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].slave_id, 7);
        assert_eq!(seen[0].start_register, 0x0010);
        assert_eq!(seen[0].quantity, 2);
    }

    #[test]
    fn span_from_config_value() {
        assert_eq!(RegisterSpan::try_from(1).unwrap(), RegisterSpan::Single);
        assert_eq!(RegisterSpan::try_from(2).unwrap(), RegisterSpan::Double);
        assert!(RegisterSpan::try_from(3).is_err());
    }
}
