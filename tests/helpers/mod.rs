//! Test helpers for mp3play integration tests
//!
//! - ScriptedDecoder / ScriptedSink: in-memory doubles that record every
//!   call into a shared journal
//! - audio_generator: deterministic WAV files for decoder tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod scripted;

pub use audio_generator::{generate_pattern_wav, generate_silent_wav};
pub use scripted::{Event, Journal, PendingBreak, ScriptedDecoder, ScriptedSink, Step};
