use serde::{Deserialize, Serialize};

use crate::audio::alsa_sink::SinkConfig;
use crate::audio::stream_decoder::{DecoderConfig, MIN_STREAM_BUFFER};
use crate::error::ConfigError;

/// Samples per channel of the largest MPEG audio frame (Layer II/III).
pub const MAX_FRAME_SAMPLES: usize = 1152;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    // 播放设备配置
    pub playback_device: String,
    pub sample_rate: u32,
    pub channels: u32,
    /// Period size in frames, 0 lets ALSA decide
    pub period_size: usize,
    pub volume: f32,
    pub position: f32,

    // 解码配置
    /// Capacity of each sample buffer, in interleaved samples
    pub buffer_size: usize,
    pub check_validity: bool,
    pub stream_buffer_size: usize,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            playback_device: env!("PLAYBACK_DEVICE").to_string(),
            sample_rate: env!("PLAYBACK_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse PLAYBACK_SAMPLE_RATE")?,
            channels: env!("PLAYBACK_CHANNELS").parse()
                .map_err(|_| "Failed to parse PLAYBACK_CHANNELS")?,
            period_size: env!("PLAYBACK_PERIOD_SIZE").parse()
                .map_err(|_| "Failed to parse PLAYBACK_PERIOD_SIZE")?,
            volume: env!("PLAYBACK_VOLUME").parse()
                .map_err(|_| "Failed to parse PLAYBACK_VOLUME")?,
            position: env!("PLAYBACK_POSITION").parse()
                .map_err(|_| "Failed to parse PLAYBACK_POSITION")?,

            buffer_size: env!("DECODER_BUFFER_SIZE").parse()
                .map_err(|_| "Failed to parse DECODER_BUFFER_SIZE")?,
            check_validity: env!("DECODER_CHECK_VALIDITY").parse()
                .map_err(|_| "Failed to parse DECODER_CHECK_VALIDITY")?,
            stream_buffer_size: env!("DECODER_STREAM_BUFFER_SIZE").parse()
                .map_err(|_| "Failed to parse DECODER_STREAM_BUFFER_SIZE")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=2).contains(&self.channels) {
            return Err(invalid("channels", format!("{} (expected 1 or 2)", self.channels)));
        }
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be positive".to_string()));
        }
        let min_buffer = MAX_FRAME_SAMPLES * self.channels as usize;
        if self.buffer_size < min_buffer {
            return Err(invalid(
                "buffer_size",
                format!("{} samples, need at least {}", self.buffer_size, min_buffer),
            ));
        }
        if !self.stream_buffer_size.is_power_of_two() || self.stream_buffer_size <= MIN_STREAM_BUFFER {
            return Err(invalid(
                "stream_buffer_size",
                format!(
                    "{} bytes, must be a power of two above {}",
                    self.stream_buffer_size, MIN_STREAM_BUFFER
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(invalid("volume", format!("{} (expected 0.0 to 1.0)", self.volume)));
        }
        if !(0.0..=1.0).contains(&self.position) {
            return Err(invalid("position", format!("{} (expected 0.0 to 1.0)", self.position)));
        }
        Ok(())
    }

    /// Decoder settings for the format the device actually negotiated.
    pub fn decoder_config(&self, sample_rate: u32, channels: u32) -> DecoderConfig {
        DecoderConfig {
            sample_rate,
            channels,
            check_validity: self.check_validity,
            stream_buffer_size: self.stream_buffer_size,
        }
    }

    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            device: self.playback_device.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            period_size: (self.period_size > 0).then_some(self.period_size),
            volume: self.volume,
            position: self.position,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            playback_device: "default".to_string(),
            sample_rate: 44100,
            channels: 2,
            period_size: 1024,
            volume: 1.0,
            position: 0.5,
            buffer_size: 32768,
            check_validity: false,
            stream_buffer_size: 64 * 1024,
        }
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError { field, reason }
}
