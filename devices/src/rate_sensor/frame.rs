//! Rate sensor serial frame layout.
//!
//! | Offset | Size | Field                           |
//! |--------|------|---------------------------------|
//! | 0      | 1    | Sync byte `0xAA`                |
//! | 1      | 6    | Angular rate X/Y/Z (i16)        |
//! | 7      | 6    | Status words 1/2/3 (u16)        |
//! | 13     | 12   | Summed angle X/Y/Z (i32)        |
//! | 25     | 2    | Byte-sum checksum (u16)         |
//!
//! All multi-byte fields are little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::checksum::{byte_sum16, verify_sum16_frame};
use crate::error::{EncodeError, EncodeResult};

use super::scaling::{counts_to_angle, counts_to_rate};
use super::status_words::{StatusWord1, StatusWord2, StatusWord3};

/// Frame synchronization byte.
pub const SYNC_BYTE: u8 = 0xAA;

/// Total frame length in bytes.
pub const FRAME_LEN: usize = 27;

/// Raw field values of one rate sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateSensorPacket {
    /// Angular rate counts, X/Y/Z
    pub rates: [i16; 3],
    /// Packed status words 1/2/3
    pub status_words: [u16; 3],
    /// Summed angle counts, X/Y/Z
    pub angles: [i32; 3],
}

impl RateSensorPacket {
    /// Serialize to a complete frame including sync byte and checksum.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_LEN);
        buf.put_u8(SYNC_BYTE);
        for &rate in &self.rates {
            buf.put_i16_le(rate);
        }
        for &word in &self.status_words {
            buf.put_u16_le(word);
        }
        for &angle in &self.angles {
            buf.put_i32_le(angle);
        }
        let checksum = byte_sum16(&buf[1..]);
        buf.put_u16_le(checksum);
        buf.freeze()
    }

    /// Parse and verify a complete frame.
    ///
    /// # Errors
    /// Fails on wrong length, missing sync byte or checksum mismatch.
    pub fn parse(frame: &[u8]) -> EncodeResult<Self> {
        if frame.len() != FRAME_LEN {
            return Err(EncodeError::FrameLength {
                expected: FRAME_LEN,
                actual: frame.len(),
            });
        }
        if frame[0] != SYNC_BYTE {
            return Err(EncodeError::Header(frame[0]));
        }
        if !verify_sum16_frame(frame) {
            return Err(EncodeError::Checksum {
                stored: u16::from_le_bytes([frame[FRAME_LEN - 2], frame[FRAME_LEN - 1]]),
                computed: byte_sum16(&frame[1..FRAME_LEN - 2]),
            });
        }

        let mut body = &frame[1..FRAME_LEN - 2];
        let rates = [body.get_i16_le(), body.get_i16_le(), body.get_i16_le()];
        let status_words = [body.get_u16_le(), body.get_u16_le(), body.get_u16_le()];
        let angles = [body.get_i32_le(), body.get_i32_le(), body.get_i32_le()];

        Ok(Self {
            rates,
            status_words,
            angles,
        })
    }

    /// Angular rates in rad/s.
    pub fn rates_rad_per_sec(&self) -> [f64; 3] {
        self.rates.map(counts_to_rate)
    }

    /// Summed angles in radians.
    pub fn angles_rad(&self) -> [f64; 3] {
        self.angles.map(counts_to_angle)
    }

    pub fn word1(&self) -> StatusWord1 {
        StatusWord1::unpack(self.status_words[0])
    }

    pub fn word2(&self) -> StatusWord2 {
        StatusWord2::unpack(self.status_words[1])
    }

    pub fn word3(&self) -> StatusWord3 {
        StatusWord3::unpack(self.status_words[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> RateSensorPacket {
        RateSensorPacket {
            rates: [100, -200, 32767],
            status_words: [0x0097, 0x0019, 0x8700],
            angles: [134_217_728, -1, 0],
        }
    }

    #[test]
    fn test_frame_layout() {
        let frame = sample_packet().to_bytes();
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(frame[0], 0xAA);
        // Rate X = 100 little-endian
        assert_eq!(&frame[1..3], &[0x64, 0x00]);
        // Rate Y = -200 little-endian
        assert_eq!(&frame[3..5], &[0x38, 0xFF]);
        // Status word 3
        assert_eq!(&frame[11..13], &[0x00, 0x87]);
        // Angle X = 2^27
        assert_eq!(&frame[13..17], &[0x00, 0x00, 0x00, 0x08]);
        // Angle Y = -1
        assert_eq!(&frame[17..21], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_checksum_is_byte_sum_after_sync() {
        let frame = sample_packet().to_bytes();
        let expected: u32 = frame[1..FRAME_LEN - 2].iter().map(|&b| u32::from(b)).sum();
        let stored = u16::from_le_bytes([frame[FRAME_LEN - 2], frame[FRAME_LEN - 1]]);
        assert_eq!(u32::from(stored), expected % 65536);
    }

    #[test]
    fn test_parse_recovers_fields() {
        let packet = sample_packet();
        let parsed = RateSensorPacket::parse(&packet.to_bytes()).unwrap();
        assert_eq!(parsed, packet);
        assert!(parsed.word1().agc_voltage_failed);
        assert_eq!(parsed.word2().temperature_c, 25);
        assert!(parsed.word3().rs_ok);
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        let frame = sample_packet().to_bytes();

        assert_eq!(
            RateSensorPacket::parse(&frame[..FRAME_LEN - 1]),
            Err(EncodeError::FrameLength {
                expected: FRAME_LEN,
                actual: FRAME_LEN - 1
            })
        );

        let mut bad_sync = frame.to_vec();
        bad_sync[0] = 0x55;
        assert_eq!(RateSensorPacket::parse(&bad_sync), Err(EncodeError::Header(0x55)));

        let mut corrupted = frame.to_vec();
        corrupted[5] ^= 0x01;
        assert!(matches!(
            RateSensorPacket::parse(&corrupted),
            Err(EncodeError::Checksum { .. })
        ));
    }
}
