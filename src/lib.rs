//! mp3play - gapless double-buffered playback of a compressed audio file.
//!
//! The [`pipeline::Pipeline`] decodes one unit ahead into the idle buffer
//! while the sink plays the other, chaining each request behind its
//! predecessor.

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;

pub use config::Config;
pub use error::{ConfigError, DecodeError, PipelineError, SinkError};
pub use pipeline::{Outcome, Pipeline, PipelineState, SessionReport};
