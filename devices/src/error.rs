//! Errors raised by encoders and decoders.

use thiserror::Error;

/// Errors that can occur while encoding or decoding device frames.
///
/// Encoding only fails when the caller hands over a vector of the wrong
/// shape. Decoding fails on anything that does not look like a frame the
/// encoder could have produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Input vector length does not match any layout the device accepts.
    #[error("{device}: expected {expected} values, got {actual}")]
    VectorLength {
        /// Device the vector was meant for
        device: &'static str,
        /// Human-readable list of accepted lengths
        expected: &'static str,
        /// Length actually supplied
        actual: usize,
    },

    /// Primary-only input without redundant-channel synthesis enabled.
    #[error("6-value rate sensor input requires duplicate_to_redundant")]
    RedundantChannelsMissing,

    /// Frame has the wrong size for its type.
    #[error("frame length {actual}, expected {expected}")]
    FrameLength {
        /// Size required by the protocol
        expected: usize,
        /// Size of the buffer supplied
        actual: usize,
    },

    /// Leading sync/address/type byte is not what the protocol requires.
    #[error("unexpected header byte 0x{0:02X}")]
    Header(u8),

    /// Stored checksum or CRC disagrees with the recomputed one.
    #[error("checksum mismatch: stored 0x{stored:04X}, computed 0x{computed:04X}")]
    Checksum {
        /// Value found in the frame
        stored: u16,
        /// Value recomputed from the frame body
        computed: u16,
    },
}

/// Result type for encoder and decoder operations.
pub type EncodeResult<T> = Result<T, EncodeError>;
