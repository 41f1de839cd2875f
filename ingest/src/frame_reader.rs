//! Reassembly of 8-byte samples from an unframed byte stream.
//!
//! TCP delivers the simulator's doubles in arbitrary chunks; a sample may be
//! split across any number of reads. Bytes are buffered until a whole
//! sample is available.

use bytes::{Bytes, BytesMut};

/// Size of one IEEE-754 double sample.
pub const SAMPLE_LEN: usize = 8;

/// Per-channel reassembly buffer.
#[derive(Debug, Default)]
pub struct FloatFrameReader {
    buffer: BytesMut,
}

impl FloatFrameReader {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(SAMPLE_LEN * 64),
        }
    }

    /// Append bytes received from the socket.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Remove and return every complete sample, oldest first.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let complete = self.buffer.len() / SAMPLE_LEN;
        (0..complete)
            .map(|_| self.buffer.split_to(SAMPLE_LEN).freeze())
            .collect()
    }

    /// Bytes buffered toward the next sample.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Take the incomplete trailing bytes, leaving the reader empty.
    ///
    /// Called when the peer disconnects; returns `None` if nothing was
    /// pending.
    pub fn take_partial(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().freeze())
        }
    }

    /// Discard buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sample_reassembles() {
        let bytes = 0.0001745f64.to_le_bytes();
        let mut reader = FloatFrameReader::new();

        reader.push(&bytes[..7]);
        assert!(reader.drain().is_empty());
        assert_eq!(reader.pending(), 7);

        reader.push(&bytes[7..]);
        let frames = reader.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &bytes);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn test_multiple_samples_in_one_read() {
        let mut data = Vec::new();
        for v in [1.0f64, 2.0, 3.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&[0xAB, 0xCD]);

        let mut reader = FloatFrameReader::new();
        reader.push(&data);
        let frames = reader.drain();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].as_ref(), &3.0f64.to_le_bytes());
        assert_eq!(reader.pending(), 2);
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = (-42.5f64).to_be_bytes();
        let mut reader = FloatFrameReader::new();
        let mut frames = Vec::new();
        for b in bytes {
            reader.push(&[b]);
            frames.extend(reader.drain());
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), &bytes);
    }

    #[test]
    fn test_take_partial() {
        let mut reader = FloatFrameReader::new();
        assert!(reader.take_partial().is_none());

        reader.push(&[1, 2, 3]);
        let partial = reader.take_partial().unwrap();
        assert_eq!(partial.as_ref(), &[1, 2, 3]);
        assert_eq!(reader.pending(), 0);
    }
}
