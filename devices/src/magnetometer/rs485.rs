//! Magnetometer RS485 frames.
//!
//! | Offset | Size | Field                              |
//! |--------|------|------------------------------------|
//! | 0      | 1    | Message type                       |
//! | 1      | 1    | Command                            |
//! | 2      | 2    | Sequence counter (u16 LE)          |
//! | 4      | n    | Payload                            |
//! | 4+n    | 2    | CRC-16/MODBUS of bytes 0..4+n (LE) |
//!
//! Data payload: X/Y/Z field as i16 little-endian plus the status byte
//! (13-byte frame). Temperature payload: i16 little-endian °C (8-byte
//! frame).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::checksum::{crc16_modbus, verify_crc16_frame};
use crate::error::{EncodeError, EncodeResult};

/// Command byte for field data frames.
pub const DATA_COMMAND: u8 = 0x01;

/// Command byte for temperature frames.
pub const TEMP_COMMAND: u8 = 0x05;

/// Header length (type, command, sequence).
pub const HEADER_LEN: usize = 4;

/// Complete field data frame length.
pub const DATA_FRAME_LEN: usize = 13;

/// Complete temperature frame length.
pub const TEMP_FRAME_LEN: usize = 8;

/// Decoded RS485 frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rs485Header {
    pub message_type: u8,
    pub command: u8,
    pub sequence: u16,
}

/// Decoded RS485 field data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rs485DataFrame {
    pub header: Rs485Header,
    pub field: [i16; 3],
    pub status: u8,
}

pub(crate) fn frame(header: Rs485Header, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + 2);
    buf.put_u8(header.message_type);
    buf.put_u8(header.command);
    buf.put_u16_le(header.sequence);
    buf.put_slice(payload);
    let crc = crc16_modbus(&buf);
    buf.put_u16_le(crc);
    buf.freeze()
}

pub(crate) fn data_payload(field_counts: [i16; 3], status: u8) -> [u8; 7] {
    let mut payload = [0u8; 7];
    for (axis, count) in field_counts.iter().enumerate() {
        payload[axis * 2..axis * 2 + 2].copy_from_slice(&count.to_le_bytes());
    }
    payload[6] = status;
    payload
}

fn check_frame(frame: &[u8], expected: usize) -> EncodeResult<Rs485Header> {
    if frame.len() != expected {
        return Err(EncodeError::FrameLength {
            expected,
            actual: frame.len(),
        });
    }
    if !verify_crc16_frame(frame) {
        let data_end = frame.len() - 2;
        return Err(EncodeError::Checksum {
            stored: u16::from_le_bytes([frame[data_end], frame[data_end + 1]]),
            computed: crc16_modbus(&frame[..data_end]),
        });
    }
    let mut header = &frame[..HEADER_LEN];
    Ok(Rs485Header {
        message_type: header.get_u8(),
        command: header.get_u8(),
        sequence: header.get_u16_le(),
    })
}

/// Parse and CRC-check a field data frame.
pub fn parse_data(frame: &[u8]) -> EncodeResult<Rs485DataFrame> {
    let header = check_frame(frame, DATA_FRAME_LEN)?;
    let mut body = &frame[HEADER_LEN..DATA_FRAME_LEN - 2];
    let field = [body.get_i16_le(), body.get_i16_le(), body.get_i16_le()];
    Ok(Rs485DataFrame {
        header,
        field,
        status: body.get_u8(),
    })
}

/// Parse and CRC-check a temperature frame, returning header and °C counts.
pub fn parse_temperature(frame: &[u8]) -> EncodeResult<(Rs485Header, i16)> {
    let header = check_frame(frame, TEMP_FRAME_LEN)?;
    Ok((header, i16::from_le_bytes([frame[4], frame[5]])))
}
