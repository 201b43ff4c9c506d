//! Safe wrapper around SpeexDSP's resampler.

use std::ffi::c_int;

// ======================== FFI declarations ========================

/// Opaque type for SpeexResamplerState
#[repr(C)]
pub struct SpeexResamplerState {
    _private: [u8; 0],
}

const SPEEX_RESAMPLER_QUALITY_DEFAULT: c_int = 4;
const RESAMPLER_ERR_SUCCESS: c_int = 0;
const OUTPUT_HEADROOM_FRAMES: usize = 8;

unsafe extern "C" {
    fn speex_resampler_init(
        nb_channels: u32,
        in_rate: u32,
        out_rate: u32,
        quality: c_int,
        err: *mut c_int,
    ) -> *mut SpeexResamplerState;
    fn speex_resampler_destroy(st: *mut SpeexResamplerState);
    fn speex_resampler_process_interleaved_int(
        st: *mut SpeexResamplerState,
        in_: *const i16,
        in_len: *mut u32,
        out: *mut i16,
        out_len: *mut u32,
    ) -> c_int;
    fn speex_resampler_reset_mem(st: *mut SpeexResamplerState) -> c_int;
    fn speex_resampler_skip_zeros(st: *mut SpeexResamplerState) -> c_int;
    fn speex_resampler_get_input_latency(st: *const SpeexResamplerState) -> c_int;
}

// ======================== Resampler ========================

/// Interleaved 16-bit sample rate converter.
pub struct Resampler {
    state: *mut SpeexResamplerState,
    channels: usize,
    in_rate: u32,
    out_rate: u32,
}

// SpeexResamplerState is only touched through &mut self
unsafe impl Send for Resampler {}

impl Resampler {
    /// Create a new resampler.
    ///
    /// * `channels` - Number of interleaved channels
    /// * `in_rate`  - Input sample rate
    /// * `out_rate` - Output sample rate
    pub fn new(channels: u32, in_rate: u32, out_rate: u32) -> anyhow::Result<Self> {
        if channels == 0 {
            anyhow::bail!("Resampler needs at least one channel");
        }
        let mut err: c_int = 0;
        let state = unsafe {
            speex_resampler_init(
                channels,
                in_rate,
                out_rate,
                SPEEX_RESAMPLER_QUALITY_DEFAULT,
                &mut err,
            )
        };
        if err != RESAMPLER_ERR_SUCCESS || state.is_null() {
            anyhow::bail!("Failed to initialize speex resampler: err={}", err);
        }
        // 跳过滤波器引入的前导零，输出与输入对齐
        unsafe {
            speex_resampler_skip_zeros(state);
        }
        Ok(Self {
            state,
            channels: channels as usize,
            in_rate,
            out_rate,
        })
    }

    pub fn in_rate(&self) -> u32 {
        self.in_rate
    }

    /// Input frames held back by the filter. Feeding this many frames of
    /// silence at end of stream pushes the remaining output out.
    pub fn input_latency(&self) -> usize {
        let latency = unsafe { speex_resampler_get_input_latency(self.state) };
        latency.max(0) as usize
    }

    /// Upper bound of output frames for `in_frames` input frames, with
    /// headroom for the fractional phase speex carries between calls.
    pub fn max_output_frames(&self, in_frames: usize) -> usize {
        (in_frames as u64 * self.out_rate as u64).div_ceil(self.in_rate as u64) as usize
            + OUTPUT_HEADROOM_FRAMES
    }

    /// Resample interleaved frames from `input` into `output`.
    ///
    /// Returns `(input_frames_consumed, output_frames_produced)`.
    pub fn process(&mut self, input: &[i16], output: &mut [i16]) -> anyhow::Result<(usize, usize)> {
        let mut in_len = (input.len() / self.channels) as u32;
        let mut out_len = (output.len() / self.channels) as u32;
        let err = unsafe {
            speex_resampler_process_interleaved_int(
                self.state,
                input.as_ptr(),
                &mut in_len,
                output.as_mut_ptr(),
                &mut out_len,
            )
        };
        if err != RESAMPLER_ERR_SUCCESS {
            anyhow::bail!("Speex resampler error: {}", err);
        }
        Ok((in_len as usize, out_len as usize))
    }

    /// Forget filter history, e.g. after a seek.
    pub fn reset(&mut self) {
        unsafe {
            speex_resampler_reset_mem(self.state);
            speex_resampler_skip_zeros(self.state);
        }
    }
}

impl Drop for Resampler {
    fn drop(&mut self) {
        unsafe {
            speex_resampler_destroy(self.state);
        }
    }
}
