//! Frame decoding: raw WebSocket bytes to `f32` samples.
//!
//! Clients send mono little-endian IEEE-754 single precision samples with no header.
//! The byte order is a protocol assumption and is never negotiated.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// Width of one sample on the wire.
pub const SAMPLE_WIDTH: usize = 4;

/// Why a buffer could not be turned into samples.
///
/// These never reach the client; the pipeline reports them as "no result".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Zero-length buffer
    Empty,
    /// Length is not a multiple of the sample width
    Misaligned { len: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Empty => write!(f, "audio frame is empty"),
            FrameError::Misaligned { len } => write!(
                f,
                "audio frame length {} is not a multiple of {} bytes",
                len, SAMPLE_WIDTH
            ),
        }
    }
}

/// Decode a buffer of little-endian `f32` samples.
pub fn decode_frame(data: &[u8]) -> Result<Vec<f32>, FrameError> {
    if data.is_empty() {
        return Err(FrameError::Empty);
    }

    if data.len() % SAMPLE_WIDTH != 0 {
        return Err(FrameError::Misaligned { len: data.len() });
    }

    let mut samples = vec![0.0f32; data.len() / SAMPLE_WIDTH];
    LittleEndian::read_f32_into(data, &mut samples);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_little_endian() {
        let mut data = Vec::new();
        for s in [0.0f32, 0.5, -1.0, 0.25] {
            data.extend_from_slice(&s.to_le_bytes());
        }

        assert_eq!(decode_frame(&data).unwrap(), vec![0.0, 0.5, -1.0, 0.25]);
    }

    #[test]
    fn test_rejects_empty_and_misaligned() {
        assert_eq!(decode_frame(&[]), Err(FrameError::Empty));
        assert_eq!(decode_frame(&[0u8; 7]), Err(FrameError::Misaligned { len: 7 }));
        assert_eq!(decode_frame(&[0u8; 1]), Err(FrameError::Misaligned { len: 1 }));
    }
}
