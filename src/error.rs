//! Error taxonomy for a playback session.
//!
//! End-of-stream and cancellation are not errors; they are reported through
//! [`crate::pipeline::Outcome`].

use thiserror::Error;

use crate::audio::request::RequestId;

/// Failure of the decoder collaborator. Always fatal for the session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open stream {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported stream: {0}")]
    Unsupported(String),

    #[error("corrupt frame: {0}")]
    Corrupt(String),

    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoded frame of {samples} samples does not fit a buffer of {capacity}")]
    FrameTooLarge { samples: usize, capacity: usize },

    #[error("resampler failure: {0}")]
    Resample(String),
}

/// Failure reported by the audio sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("failed to open audio device: {0}")]
    Open(String),

    #[error("request rejected: {0}")]
    Submit(String),

    #[error("device write failed: {0}")]
    Write(String),

    #[error("audio device thread is gone")]
    Disconnected,

    #[error("unknown request {0}")]
    UnknownRequest(RequestId),
}

/// Terminal error of a playback session.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("decode failed: {0}")]
    Decode(#[source] DecodeError),

    #[error("submit failed: {0}")]
    SinkSubmit(#[source] SinkError),

    #[error("playback failed: {0}")]
    SinkWait(#[source] SinkError),

    #[error("not enough memory for {requested} samples in buffer {slot}")]
    ResourceExhaustion { slot: usize, requested: usize },
}

/// Rejected configuration value.
#[derive(Debug, Error)]
#[error("invalid {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}
