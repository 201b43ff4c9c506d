//! [`FrameDecoder`] over symphonia.
//!
//! Each call pulls one packet of the audio track, decodes it and converts it
//! to the device format: channel conversion first, then sample rate
//! conversion through the speex resampler (only when the rates differ).

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::{SampleBuffer as InterleavedSamples, SignalSpec};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::buffer::SampleBuffer;
use super::speex::Resampler;
use super::stream_decoder::{DecodedFrame, DecoderConfig, FrameDecoder, MIN_STREAM_BUFFER};
use crate::error::DecodeError;

/// Interleaving scratch, reallocated only when the signal grows.
struct Scratch {
    spec: SignalSpec,
    frames: u64,
    samples: InterleavedSamples<i16>,
}

pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    target_rate: u32,
    target_channels: usize,
    resampler: Option<Resampler>,
    /// Resampler tail already emitted after end of input
    flushed: bool,
    scratch: Option<Scratch>,
    converted: Vec<i16>,
}

impl SymphoniaDecoder {
    /// Open `path` and prepare to decode its first audio track.
    pub fn open(path: &Path, config: &DecoderConfig) -> Result<Self, DecodeError> {
        if config.sample_rate == 0 || config.channels == 0 {
            return Err(DecodeError::Unsupported(format!(
                "target format {} Hz / {} channels",
                config.sample_rate, config.channels
            )));
        }
        if !config.stream_buffer_size.is_power_of_two()
            || config.stream_buffer_size <= MIN_STREAM_BUFFER
        {
            return Err(DecodeError::Unsupported(format!(
                "stream buffer of {} bytes",
                config.stream_buffer_size
            )));
        }

        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let mut stream_opts = MediaSourceStreamOptions::default();
        stream_opts.buffer_len = config.stream_buffer_size;
        let mss = MediaSourceStream::new(Box::new(file), stream_opts);

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Unsupported(format!("unrecognised container: {}", e)))?
            .format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("no audio track found".to_string()))?;
        let track_id = track.id;
        let time_base = track.codec_params.time_base;

        let mut decoder_opts = DecoderOptions::default();
        decoder_opts.verify = config.check_validity;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(|e| DecodeError::Unsupported(format!("failed to create decoder: {}", e)))?;

        log::info!(
            "Stream opened: {}, source rate={:?}, channels={:?}, target {} Hz / {} ch",
            path.display(),
            track.codec_params.sample_rate,
            track.codec_params.channels.map(|c| c.count()),
            config.sample_rate,
            config.channels,
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base,
            target_rate: config.sample_rate,
            target_channels: config.channels as usize,
            resampler: None,
            flushed: false,
            scratch: None,
            converted: Vec::new(),
        })
    }

    /// Reposition the stream. Returns the position actually reached.
    pub fn seek(&mut self, position: Duration) -> Result<Duration, DecodeError> {
        let time = Time::new(
            position.as_secs(),
            position.subsec_nanos() as f64 / 1_000_000_000.0,
        );
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| match e {
                SymphoniaError::IoError(e) => DecodeError::Io(e),
                e => DecodeError::Unsupported(format!("seek failed: {}", e)),
            })?;

        self.decoder.reset();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.flushed = false;

        let reached = self
            .time_base
            .map(|tb| {
                let t = tb.calc_time(seeked.actual_ts);
                Duration::from_secs(t.seconds) + Duration::from_secs_f64(t.frac)
            })
            .unwrap_or(position);
        log::debug!("Seek to {:?} reached {:?}", position, reached);
        Ok(reached)
    }
}

impl SymphoniaDecoder {
    /// Emit the samples still held in the resampler filter, once.
    fn flush_resampler(&mut self, target: &mut SampleBuffer) -> Result<DecodedFrame, DecodeError> {
        if self.flushed {
            return Ok(DecodedFrame::end_of_stream());
        }
        self.flushed = true;
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(DecodedFrame::end_of_stream());
        };

        let channels = self.target_channels;
        self.converted.clear();
        self.converted.resize(resampler.input_latency() * channels, 0);
        let produced = resample_into(resampler, &self.converted, channels, target)?;
        if produced == 0 {
            return Ok(DecodedFrame::end_of_stream());
        }
        log::debug!("Flushed {} resampled frames at end of stream", produced);
        target.set_len(produced * channels);
        Ok(DecodedFrame {
            samples: produced,
            channels,
        })
    }
}

impl FrameDecoder for SymphoniaDecoder {
    fn decode_next(&mut self, target: &mut SampleBuffer) -> Result<DecodedFrame, DecodeError> {
        target.clear();

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return self.flush_resampler(target);
                }
                Err(SymphoniaError::IoError(e)) => return Err(DecodeError::Io(e)),
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::IoError(e)) => return Err(DecodeError::Io(e)),
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;

            if !matches!(&self.scratch, Some(s) if s.spec == spec && s.frames >= capacity) {
                self.scratch = None;
            }
            let scratch = self.scratch.get_or_insert_with(|| Scratch {
                spec,
                frames: capacity,
                samples: InterleavedSamples::new(capacity, spec),
            });
            scratch.samples.copy_interleaved_ref(decoded);

            convert_channels(
                scratch.samples.samples(),
                spec.channels.count(),
                self.target_channels,
                &mut self.converted,
            );

            let channels = self.target_channels;
            let out_frames = if spec.rate == self.target_rate {
                let needed = self.converted.len();
                if needed > target.capacity() {
                    return Err(DecodeError::FrameTooLarge {
                        samples: needed,
                        capacity: target.capacity(),
                    });
                }
                target.spare_mut()[..needed].copy_from_slice(&self.converted);
                needed / channels
            } else {
                match self.resampler.as_mut() {
                    Some(resampler) if resampler.in_rate() == spec.rate => {
                        resample_into(resampler, &self.converted, channels, target)?
                    }
                    _ => {
                        log::info!("Resampling {} Hz -> {} Hz", spec.rate, self.target_rate);
                        let mut resampler =
                            Resampler::new(channels as u32, spec.rate, self.target_rate)
                                .map_err(|e| DecodeError::Resample(format!("{:#}", e)))?;
                        let produced =
                            resample_into(&mut resampler, &self.converted, channels, target)?;
                        self.resampler = Some(resampler);
                        produced
                    }
                }
            };

            if out_frames == 0 {
                continue;
            }

            target.set_len(out_frames * channels);
            return Ok(DecodedFrame {
                samples: out_frames,
                channels,
            });
        }
    }
}

impl Drop for SymphoniaDecoder {
    fn drop(&mut self) {
        log::debug!("Stream closed");
    }
}

fn resample_into(
    resampler: &mut Resampler,
    input: &[i16],
    channels: usize,
    target: &mut SampleBuffer,
) -> Result<usize, DecodeError> {
    let in_frames = input.len() / channels;
    let needed = resampler.max_output_frames(in_frames) * channels;
    if needed > target.capacity() {
        return Err(DecodeError::FrameTooLarge {
            samples: needed,
            capacity: target.capacity(),
        });
    }

    let (consumed, produced) = resampler
        .process(input, &mut target.spare_mut()[..needed])
        .map_err(|e| DecodeError::Resample(format!("{:#}", e)))?;
    if consumed < in_frames {
        return Err(DecodeError::Resample(format!(
            "resampler consumed {} of {} frames",
            consumed, in_frames
        )));
    }
    Ok(produced)
}

/// Convert interleaved `input` from `in_channels` to `out_channels` into `out`.
///
/// Downmix to mono averages all channels; any other mismatch wraps source
/// channels around (mono → stereo duplicates).
pub(crate) fn convert_channels(
    input: &[i16],
    in_channels: usize,
    out_channels: usize,
    out: &mut Vec<i16>,
) {
    out.clear();
    if in_channels == out_channels {
        out.extend_from_slice(input);
    } else if out_channels == 1 {
        out.extend(input.chunks_exact(in_channels).map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / in_channels as i32) as i16
        }));
    } else {
        for frame in input.chunks_exact(in_channels) {
            out.extend((0..out_channels).map(|c| frame[c % in_channels]));
        }
    }
}
