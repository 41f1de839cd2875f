//! Encoded frame container.

use std::fmt;

use bytes::Bytes;

/// A complete frame ready for a transmitter.
///
/// Frames are immutable once built. CAN frames keep their arbitration
/// identifier next to the payload since it is not part of the data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedFrame {
    /// Byte stream frame for serial, RS485 or TCP links.
    Stream(Bytes),
    /// CAN frame with its standard identifier.
    Can {
        /// 11-bit arbitration identifier
        id: u16,
        /// Payload bytes (at most 8)
        data: Bytes,
    },
}

impl EncodedFrame {
    /// Payload bytes of the frame.
    pub fn bytes(&self) -> &Bytes {
        match self {
            EncodedFrame::Stream(bytes) => bytes,
            EncodedFrame::Can { data, .. } => data,
        }
    }

    /// Number of payload bytes.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// CAN identifier, if this is a CAN frame.
    pub fn can_id(&self) -> Option<u16> {
        match self {
            EncodedFrame::Stream(_) => None,
            EncodedFrame::Can { id, .. } => Some(*id),
        }
    }

    /// Space-separated uppercase hex dump of the payload.
    pub fn to_hex(&self) -> String {
        self.bytes()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for EncodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodedFrame::Stream(_) => write!(f, "[{}] {}", self.len(), self.to_hex()),
            EncodedFrame::Can { id, .. } => write!(f, "CAN 0x{id:03X} [{}] {}", self.len(), self.to_hex()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_frame_accessors() {
        let frame = EncodedFrame::Stream(Bytes::from_static(&[0xAA, 0x01, 0xFF]));
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.can_id(), None);
        assert_eq!(frame.to_hex(), "AA 01 FF");
        assert_eq!(frame.to_string(), "[3] AA 01 FF");
    }

    #[test]
    fn test_can_frame_display() {
        let frame = EncodedFrame::Can {
            id: 0x101,
            data: Bytes::from_static(&[0x00, 0x10]),
        };
        assert_eq!(frame.can_id(), Some(0x101));
        assert_eq!(frame.to_string(), "CAN 0x101 [2] 00 10");
    }
}
