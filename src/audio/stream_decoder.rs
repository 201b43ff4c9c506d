//! Frame-at-a-time decoder seam of the playback pipeline.

use super::buffer::SampleBuffer;
use crate::error::DecodeError;

/// Compressed-stream read-ahead must be a power of two larger than this.
pub const MIN_STREAM_BUFFER: usize = 32 * 1024;

/// Result of one decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Samples per channel written to the target buffer. Zero at end of stream.
    pub samples: usize,
    pub channels: usize,
}

impl DecodedFrame {
    pub fn end_of_stream() -> Self {
        Self {
            samples: 0,
            channels: 0,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.samples == 0
    }

    /// Interleaved samples occupied in the buffer.
    pub fn interleaved_len(&self) -> usize {
        self.samples * self.channels
    }
}

/// Settings handed to a decoder when the stream is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Output sample rate, normally the rate the device negotiated
    pub sample_rate: u32,
    /// Output channel count
    pub channels: u32,
    /// Let the codec verify frame integrity where it can
    pub check_validity: bool,
    /// Read-ahead of the compressed stream in bytes
    pub stream_buffer_size: usize,
}

/// A decoder that turns the next decodable unit of a compressed stream into
/// interleaved i16 PCM.
///
/// Each call consumes exactly one unit. The target's previous contents are
/// discarded; on error they are undefined and must not be played.
pub trait FrameDecoder {
    fn decode_next(&mut self, target: &mut SampleBuffer) -> Result<DecodedFrame, DecodeError>;
}
