//! Frame integrity checks used by the three device protocols.
//!
//! - Rate sensor: 16-bit wrapping sum of every byte after the sync byte,
//!   stored little-endian in the last two bytes.
//! - Magnetometer RS485: CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF)
//!   over header and payload, stored little-endian.
//! - Reaction wheel: XOR of every byte after the address byte, stored in
//!   the last byte.

use crc::{Crc, CRC_16_MODBUS};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Wrapping 16-bit sum of individual bytes.
pub fn byte_sum16(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |acc, &byte| acc.wrapping_add(u16::from(byte)))
}

/// Verify a frame whose last two bytes hold the little-endian byte sum of
/// everything between the leading sync byte and the checksum.
pub fn verify_sum16_frame(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let data_end = frame.len() - 2;
    let stored = u16::from_le_bytes([frame[data_end], frame[data_end + 1]]);
    byte_sum16(&frame[1..data_end]) == stored
}

/// XOR of all bytes.
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc ^ byte)
}

/// Verify a frame whose last byte is the XOR of every byte after the
/// leading address byte.
pub fn verify_xor8_frame(frame: &[u8]) -> bool {
    if frame.len() < 2 {
        return false;
    }
    let data_end = frame.len() - 1;
    xor8(&frame[1..data_end]) == frame[data_end]
}

/// CRC-16/MODBUS of a byte slice.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    MODBUS.checksum(data)
}

/// Verify a frame whose last two bytes hold the little-endian CRC-16/MODBUS
/// of everything before them.
pub fn verify_crc16_frame(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let data_end = frame.len() - 2;
    let stored = u16::from_le_bytes([frame[data_end], frame[data_end + 1]]);
    crc16_modbus(&frame[..data_end]) == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus_check_value() {
        // Catalogue check value for CRC-16/MODBUS
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_crc16_matches_bitwise_reference() {
        fn reference(data: &[u8]) -> u16 {
            let mut crc = 0xFFFFu16;
            for &byte in data {
                crc ^= u16::from(byte);
                for _ in 0..8 {
                    if crc & 1 != 0 {
                        crc = (crc >> 1) ^ 0xA001;
                    } else {
                        crc >>= 1;
                    }
                }
            }
            crc
        }

        let data = [0x01, 0x01, 0x07, 0x00, 0x10, 0x27, 0xF0, 0xD8, 0x88, 0x13, 0x00];
        assert_eq!(crc16_modbus(&data), reference(&data));
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }

    #[test]
    fn test_byte_sum_wraps() {
        assert_eq!(byte_sum16(&[0x01, 0x02, 0x03]), 6);
        let many = vec![0xFFu8; 300];
        assert_eq!(byte_sum16(&many), ((300u32 * 0xFF) % 65536) as u16);
    }

    #[test]
    fn test_verify_sum16_frame_skips_sync() {
        // Sync byte is not part of the sum
        let frame = [0xAA, 0x01, 0x02, 0x03, 0x06, 0x00];
        assert!(verify_sum16_frame(&frame));

        let mut corrupted = frame;
        corrupted[2] = 0x05;
        assert!(!verify_sum16_frame(&corrupted));
        assert!(!verify_sum16_frame(&[0xAA, 0x00]));
    }

    #[test]
    fn test_xor_frame() {
        let frame = [0x01, 0x15, 0x80, 0x15 ^ 0x80];
        assert!(verify_xor8_frame(&frame));
        assert_eq!(xor8(&[0xF0, 0x0F]), 0xFF);
        assert!(!verify_xor8_frame(&[0x01, 0x15, 0x80, 0x00]));
    }

    #[test]
    fn test_crc_frame_roundtrip() {
        let mut frame = vec![0x01, 0x01, 0x00, 0x00, 0xAB];
        let crc = crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        assert!(verify_crc16_frame(&frame));

        frame[4] ^= 0x01;
        assert!(!verify_crc16_frame(&frame));
    }
}
