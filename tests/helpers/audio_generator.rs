//! Audio test file generation
//!
//! Writes small 16-bit PCM WAV files with known content so decoder output
//! can be checked sample by sample.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

fn spec(channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Generate a silent WAV file of `frames` frames.
pub fn generate_silent_wav<P: AsRef<Path>>(
    path: P,
    channels: u16,
    frames: usize,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec(channels))?;
    for _ in 0..frames * channels as usize {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}

/// Generate a WAV file whose sample for `(frame, channel)` is
/// [`pattern_sample`]. Returns the interleaved samples written.
pub fn generate_pattern_wav<P: AsRef<Path>>(
    path: P,
    channels: u16,
    frames: usize,
) -> Result<Vec<i16>, hound::Error> {
    let mut writer = WavWriter::create(path, spec(channels))?;
    let mut written = Vec::with_capacity(frames * channels as usize);
    for frame in 0..frames {
        for channel in 0..channels as usize {
            let sample = pattern_sample(frame, channel);
            writer.write_sample(sample)?;
            written.push(sample);
        }
    }
    writer.finalize()?;
    Ok(written)
}

/// Deterministic, channel-distinct test signal.
pub fn pattern_sample(frame: usize, channel: usize) -> i16 {
    let base = (frame % 2000) as i16 - 1000;
    if channel == 0 { base * 8 } else { -base * 4 }
}
