pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus_known_frame() {
        // Read input register 0x0001 from slave 1, count 1
        let data = [0x01, 0x04, 0x00, 0x01, 0x00, 0x01];
        let crc = crc16_modbus(&data);
        assert_eq!(crc.to_le_bytes(), [0x60, 0x0A]);
    }

    #[test]
    fn test_crc16_modbus_appended_crc_checks_to_zero() {
        let mut frame = vec![0x05, 0x04, 0x02, 0x00, 0xD7];
        let crc = crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(crc16_modbus(&frame), 0);
    }
}
