//! audio - Sample buffers, decoding and ALSA output for the playback pipeline.
//!
//! Uses symphonia for decoding, SpeexDSP for resampling and ALSA for
//! playback. The device runs on its own OS thread; everything else runs on
//! the session's control flow.

mod alsa_device;
pub mod alsa_sink;
pub mod buffer;
pub mod request;
pub mod sink;
mod speex;
pub mod stream_decoder;
pub mod symphonia_decoder;

pub use alsa_device::AlsaParams;
pub use alsa_sink::{AlsaSink, SinkConfig};
pub use buffer::{BufferPair, SampleBuffer};
pub use request::{Completion, PlaybackRequest, RequestId, RequestState, Terminal};
pub use sink::{AudioSink, Interrupt, Rejected, Wake};
pub use stream_decoder::{DecodedFrame, DecoderConfig, FrameDecoder};
pub use symphonia_decoder::SymphoniaDecoder;
