//! Reaction wheel telemetry frames.
//!
//! Health/status frame (opcode `0x15`, 23 bytes):
//!
//! | Offset | Size | Field                          |
//! |--------|------|--------------------------------|
//! | 0      | 1    | Device address                 |
//! | 1      | 1    | Opcode                         |
//! | 2      | 1    | Status byte                    |
//! | 3      | 3    | Reserved                       |
//! | 6      | 1    | MRAM state                     |
//! | 7      | 2    | Health word (u16 LE)           |
//! | 9      | 1    | Reserved                       |
//! | 10     | 4    | Temperature, °C (f32 BE)       |
//! | 14     | 4    | Bus voltage, V (f32 BE)        |
//! | 18     | 4    | Power, W (f32 BE)              |
//! | 22     | 1    | XOR of bytes 1..22             |
//!
//! Speed (`0x16`) and current (`0x17`) frames share the first six bytes,
//! followed by one f32 big-endian value and the XOR checksum (11 bytes).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::checksum::{verify_xor8_frame, xor8};
use crate::error::{EncodeError, EncodeResult};

use super::health::{HealthFlags, StatusByte};

/// Health/status telemetry opcode.
pub const OPCODE_HEALTH: u8 = 0x15;
/// Wheel speed telemetry opcode.
pub const OPCODE_SPEED: u8 = 0x16;
/// Motor current telemetry opcode.
pub const OPCODE_CURRENT: u8 = 0x17;

/// MRAM state reported in health frames.
pub const MRAM_OK: u8 = 0x01;

/// Health/status frame length.
pub const HEALTH_FRAME_LEN: usize = 23;
/// Speed or current frame length.
pub const VALUE_FRAME_LEN: usize = 11;

/// Telemetry frame selected for the processing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Telemetry {
    #[default]
    Health,
    Speed,
    Current,
}

impl Telemetry {
    pub fn opcode(self) -> u8 {
        match self {
            Telemetry::Health => OPCODE_HEALTH,
            Telemetry::Speed => OPCODE_SPEED,
            Telemetry::Current => OPCODE_CURRENT,
        }
    }
}

/// Field values of a health/status frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthFrame {
    pub address: u8,
    pub status: StatusByte,
    pub mram_state: u8,
    pub health: HealthFlags,
    pub temperature_c: f32,
    pub bus_voltage_v: f32,
    pub power_w: f32,
}

fn put_header(buf: &mut BytesMut, address: u8, opcode: u8, status: StatusByte) {
    buf.put_u8(address);
    buf.put_u8(opcode);
    buf.put_u8(status.bits());
    buf.put_bytes(0, 3);
}

fn finish(mut buf: BytesMut) -> Bytes {
    let checksum = xor8(&buf[1..]);
    buf.put_u8(checksum);
    buf.freeze()
}

impl HealthFrame {
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEALTH_FRAME_LEN);
        put_header(&mut buf, self.address, OPCODE_HEALTH, self.status);
        buf.put_u8(self.mram_state);
        buf.put_u16_le(self.health.bits());
        buf.put_u8(0);
        buf.put_f32(self.temperature_c);
        buf.put_f32(self.bus_voltage_v);
        buf.put_f32(self.power_w);
        finish(buf)
    }

    /// Parse and verify a health/status frame.
    ///
    /// # Errors
    /// Fails on wrong length, wrong opcode or checksum mismatch.
    pub fn parse(frame: &[u8]) -> EncodeResult<Self> {
        check_frame(frame, HEALTH_FRAME_LEN, OPCODE_HEALTH)?;
        let mut body = &frame[6..HEALTH_FRAME_LEN - 1];
        let mram_state = body.get_u8();
        let health = HealthFlags::from_bits_retain(body.get_u16_le());
        body.advance(1);
        Ok(Self {
            address: frame[0],
            status: StatusByte::from_bits_retain(frame[2]),
            mram_state,
            health,
            temperature_c: body.get_f32(),
            bus_voltage_v: body.get_f32(),
            power_w: body.get_f32(),
        })
    }
}

/// Build a speed or current frame.
pub fn value_frame(address: u8, opcode: u8, status: StatusByte, value: f32) -> Bytes {
    let mut buf = BytesMut::with_capacity(VALUE_FRAME_LEN);
    put_header(&mut buf, address, opcode, status);
    buf.put_f32(value);
    finish(buf)
}

/// Parse a speed or current frame, returning the status byte and value.
pub fn parse_value_frame(frame: &[u8], opcode: u8) -> EncodeResult<(StatusByte, f32)> {
    check_frame(frame, VALUE_FRAME_LEN, opcode)?;
    let mut body = &frame[6..VALUE_FRAME_LEN - 1];
    Ok((StatusByte::from_bits_retain(frame[2]), body.get_f32()))
}

fn check_frame(frame: &[u8], expected: usize, opcode: u8) -> EncodeResult<()> {
    if frame.len() != expected {
        return Err(EncodeError::FrameLength {
            expected,
            actual: frame.len(),
        });
    }
    if frame[1] != opcode {
        return Err(EncodeError::Header(frame[1]));
    }
    if !verify_xor8_frame(frame) {
        return Err(EncodeError::Checksum {
            stored: u16::from(frame[expected - 1]),
            computed: u16::from(xor8(&frame[1..expected - 1])),
        });
    }
    Ok(())
}
