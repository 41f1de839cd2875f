//! Magnetometer CAN frames.
//!
//! Data frame (id `0x101`): X/Y/Z field as i16 big-endian (1 nT/LSB)
//! followed by the status byte. Temperature frame (id `0x105`): i16
//! big-endian °C.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EncodeError, EncodeResult};

use super::status::MagStatus;

/// Field data arbitration identifier.
pub const CAN_DATA_ID: u16 = 0x101;

/// Temperature arbitration identifier.
pub const CAN_TEMP_ID: u16 = 0x105;

/// Data payload length.
pub const CAN_DATA_LEN: usize = 7;

/// Temperature payload length.
pub const CAN_TEMP_LEN: usize = 2;

pub(crate) fn data_payload(field_counts: [i16; 3], status: MagStatus) -> Bytes {
    let mut buf = BytesMut::with_capacity(CAN_DATA_LEN);
    for &count in &field_counts {
        buf.put_i16(count);
    }
    buf.put_u8(status.code());
    buf.freeze()
}

pub(crate) fn temperature_payload(temperature_counts: i16) -> Bytes {
    let mut buf = BytesMut::with_capacity(CAN_TEMP_LEN);
    buf.put_i16(temperature_counts);
    buf.freeze()
}

/// Decode a data payload into field counts and the raw status byte.
pub fn parse_data(payload: &[u8]) -> EncodeResult<([i16; 3], u8)> {
    if payload.len() != CAN_DATA_LEN {
        return Err(EncodeError::FrameLength {
            expected: CAN_DATA_LEN,
            actual: payload.len(),
        });
    }
    let mut body = payload;
    let field = [body.get_i16(), body.get_i16(), body.get_i16()];
    Ok((field, body.get_u8()))
}

/// Decode a temperature payload into °C counts.
pub fn parse_temperature(payload: &[u8]) -> EncodeResult<i16> {
    if payload.len() != CAN_TEMP_LEN {
        return Err(EncodeError::FrameLength {
            expected: CAN_TEMP_LEN,
            actual: payload.len(),
        });
    }
    Ok(i16::from_be_bytes([payload[0], payload[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_payload_is_big_endian() {
        let payload = data_payload([0x1234, -2, 0], MagStatus::Warning);
        assert_eq!(payload.as_ref(), &[0x12, 0x34, 0xFF, 0xFE, 0x00, 0x00, 0x01]);
        assert_eq!(parse_data(&payload).unwrap(), ([0x1234, -2, 0], 0x01));
    }

    #[test]
    fn test_temperature_payload() {
        let payload = temperature_payload(-40);
        assert_eq!(payload.as_ref(), &[0xFF, 0xD8]);
        assert_eq!(parse_temperature(&payload).unwrap(), -40);
        assert!(parse_temperature(&[0x00]).is_err());
    }
}
