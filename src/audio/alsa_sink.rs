//! [`AudioSink`] over an ALSA playback device.
//!
//! A dedicated `audio-play` thread owns the PCM. Requests queue on a channel
//! of depth two and are written in submission order, so a linked request's
//! samples enter the ring buffer right behind its predecessor's and play
//! without a gap. A request completes once the device has accepted all of
//! its samples; the buffer then travels back on the message port.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use alsa::pcm::{IO, PCM};
use tokio::sync::{mpsc, oneshot};

use super::alsa_device::{self, AlsaParams};
use super::buffer::{SampleBuffer, SLOTS};
use super::request::{Completion, RequestId, Terminal};
use super::sink::{AudioSink, Inflight, Interrupt, MessagePort, PortMessage, Rejected, Wake};
use crate::error::SinkError;

/// Consecutive XRUN recoveries tolerated before a request fails.
const MAX_RECOVERY_RETRIES: u32 = 3;

/// Playback device settings.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// ALSA device name (e.g. "default", "plughw:0,0")
    pub device: String,
    pub sample_rate: u32,
    pub channels: u32,
    /// `None` lets ALSA pick the period size
    pub period_size: Option<usize>,
    /// 1.0 is unity gain
    pub volume: f32,
    /// 0.0 hard left, 0.5 centre, 1.0 hard right
    pub position: f32,
}

struct WriteRequest {
    id: RequestId,
    buffer: SampleBuffer,
    link: Option<RequestId>,
    abort: Arc<AtomicBool>,
}

pub struct AlsaSink {
    commands: Option<mpsc::Sender<WriteRequest>>,
    port: MessagePort,
    inflight: Inflight,
    params: AlsaParams,
    next_id: u64,
    last_submitted: Option<RequestId>,
    drain_on_close: Arc<AtomicBool>,
    device_thread: Option<JoinHandle<()>>,
}

impl AlsaSink {
    /// Open the device and start the playback thread.
    ///
    /// Blocks until the device is configured; must not be called from within
    /// an async context.
    pub fn open(config: SinkConfig) -> Result<Self, SinkError> {
        let port = MessagePort::new();
        let (commands, requests) = mpsc::channel(SLOTS);
        let (ready_tx, ready_rx) = oneshot::channel();
        let drain_on_close = Arc::new(AtomicBool::new(false));

        let device_thread = {
            let completions = port.sender();
            let drain_on_close = drain_on_close.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    device_thread(config, requests, completions, ready_tx, &drain_on_close)
                })
                .map_err(|e| SinkError::Open(e.to_string()))?
        };

        let params = match ready_rx.blocking_recv() {
            Ok(Ok(params)) => params,
            Ok(Err(e)) => {
                let _ = device_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = device_thread.join();
                return Err(SinkError::Disconnected);
            }
        };

        Ok(Self {
            commands: Some(commands),
            port,
            inflight: Inflight::new(),
            params,
            next_id: 0,
            last_submitted: None,
            drain_on_close,
            device_thread: Some(device_thread),
        })
    }

    /// Parameters the hardware actually accepted.
    pub fn params(&self) -> &AlsaParams {
        &self.params
    }

    /// Handle that wakes a blocked `wait_or_break` with [`Wake::Break`].
    pub fn interrupt(&self) -> Interrupt {
        self.port.interrupt()
    }
}

impl AudioSink for AlsaSink {
    fn submit(
        &mut self,
        buffer: SampleBuffer,
        link: Option<RequestId>,
    ) -> Result<RequestId, Rejected> {
        let Some(commands) = &self.commands else {
            return Err(Rejected {
                buffer,
                error: SinkError::Disconnected,
            });
        };
        if let Err(error) = check_submission(
            self.last_submitted,
            link,
            buffer.len(),
            self.params.channels as usize,
            self.inflight.len(),
        ) {
            return Err(Rejected { buffer, error });
        }

        self.next_id += 1;
        let id = RequestId::new(self.next_id);
        let abort = self.inflight.register(id);
        let samples = buffer.len();
        let request = WriteRequest {
            id,
            buffer,
            link,
            abort,
        };
        if let Err(mpsc::error::SendError(request)) = commands.blocking_send(request) {
            self.inflight.retire(id);
            return Err(Rejected {
                buffer: request.buffer,
                error: SinkError::Disconnected,
            });
        }

        log::trace!("Submitted {} ({} samples, link {:?})", id, samples, link);
        self.last_submitted = Some(id);
        Ok(id)
    }

    fn wait(&mut self, id: RequestId) -> Result<Completion, SinkError> {
        if !self.inflight.contains(id) {
            return Err(SinkError::UnknownRequest(id));
        }
        let completion = self.port.wait(id)?;
        self.inflight.retire(id);
        Ok(completion)
    }

    fn wait_or_break(&mut self, id: RequestId) -> Result<Wake, SinkError> {
        if !self.inflight.contains(id) {
            return Err(SinkError::UnknownRequest(id));
        }
        let wake = self.port.wait_or_break(id)?;
        if let Wake::Completed(completion) = &wake {
            self.inflight.retire(completion.id);
        }
        Ok(wake)
    }

    fn abort(&mut self, id: RequestId) {
        if self.inflight.abort(id) {
            log::debug!("Abort requested for {}", id);
        }
    }

    fn close(&mut self, drain: bool) {
        let Some(handle) = self.device_thread.take() else {
            return;
        };
        if !drain {
            let flagged = self.inflight.abort_all();
            if flagged > 0 {
                log::debug!("Closing with {} requests still queued", flagged);
            }
        }
        self.drain_on_close.store(drain, Ordering::Release);
        // Dropping the sender ends the device loop.
        self.commands = None;
        if handle.join().is_err() {
            log::error!("Audio device thread panicked");
        }
    }
}

impl Drop for AlsaSink {
    fn drop(&mut self) {
        self.close(false);
    }
}

/// Admission rules for a new request.
fn check_submission(
    last_submitted: Option<RequestId>,
    link: Option<RequestId>,
    samples: usize,
    channels: usize,
    outstanding: usize,
) -> Result<(), SinkError> {
    if let Some(link) = link {
        if last_submitted != Some(link) {
            return Err(SinkError::Submit(format!(
                "link {} is not the last submitted request",
                link
            )));
        }
    }
    if channels == 0 || samples % channels != 0 {
        return Err(SinkError::Submit(format!(
            "{} samples do not form whole frames of {} channels",
            samples, channels
        )));
    }
    if outstanding >= SLOTS {
        return Err(SinkError::Submit(format!(
            "{} requests already outstanding",
            outstanding
        )));
    }
    Ok(())
}

/// Sends [`PortMessage::Gone`] when the device thread ends, however it ends.
struct GoneGuard(mpsc::UnboundedSender<PortMessage>);

impl Drop for GoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(PortMessage::Gone);
    }
}

/// Device operations the playback loop relies on.
trait PcmOutput {
    /// Write interleaved samples, returning the frames accepted.
    fn write(&self, samples: &[i16]) -> anyhow::Result<usize>;
    /// Prepare the device again after an XRUN or a drop.
    fn recover(&self) -> anyhow::Result<()>;
    /// Throw away whatever is queued in the ring buffer.
    fn discard(&self) -> anyhow::Result<()>;
    /// Block until the ring buffer has played out.
    fn drain(&self) -> anyhow::Result<()>;
}

struct AlsaOutput<'a> {
    pcm: &'a PCM,
    io: IO<'a, i16>,
}

impl PcmOutput for AlsaOutput<'_> {
    fn write(&self, samples: &[i16]) -> anyhow::Result<usize> {
        Ok(self.io.writei(samples)?)
    }

    fn recover(&self) -> anyhow::Result<()> {
        Ok(self.pcm.prepare()?)
    }

    fn discard(&self) -> anyhow::Result<()> {
        Ok(self.pcm.drop()?)
    }

    fn drain(&self) -> anyhow::Result<()> {
        Ok(self.pcm.drain()?)
    }
}

/// Sample layout and processing fixed when the device opened.
#[derive(Debug, Clone, Copy)]
struct OutputFormat {
    channels: usize,
    chunk_frames: usize,
    gain: Gain,
}

fn device_thread(
    config: SinkConfig,
    requests: mpsc::Receiver<WriteRequest>,
    completions: mpsc::UnboundedSender<PortMessage>,
    ready: oneshot::Sender<Result<AlsaParams, SinkError>>,
    drain_on_close: &AtomicBool,
) {
    let (pcm, params) = match alsa_device::open_playback(
        &config.device,
        config.sample_rate,
        config.channels,
        config.period_size,
    ) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(SinkError::Open(format!("{:#}", e))));
            return;
        }
    };
    let io = match pcm.io_i16() {
        Ok(io) => io,
        Err(e) => {
            let _ = ready.send(Err(SinkError::Open(e.to_string())));
            return;
        }
    };

    let channels = params.channels as usize;
    let format = OutputFormat {
        channels,
        chunk_frames: params.period_size.max(1),
        gain: Gain::new(config.volume, config.position, channels),
    };
    if ready.send(Ok(params)).is_err() {
        return;
    }

    let output = AlsaOutput { pcm: &pcm, io };
    serve(&output, requests, completions, format, drain_on_close);
    log::info!("Playback stopped");
}

/// Play queued requests in FIFO order until the queue closes, then drain or
/// discard the ring buffer.
fn serve<P: PcmOutput>(
    output: &P,
    mut requests: mpsc::Receiver<WriteRequest>,
    completions: mpsc::UnboundedSender<PortMessage>,
    format: OutputFormat,
    drain_on_close: &AtomicBool,
) {
    let _gone = GoneGuard(completions.clone());

    while let Some(mut request) = requests.blocking_recv() {
        let terminal = if request.abort.load(Ordering::Acquire) {
            Terminal::Aborted
        } else {
            format.gain.apply(request.buffer.as_mut_slice());
            write_request(output, request.buffer.as_slice(), format, &request.abort)
        };

        log::trace!(
            "Request {} (link {:?}) settled: {:?}",
            request.id,
            request.link,
            terminal
        );

        let completion = Completion {
            id: request.id,
            buffer: request.buffer,
            terminal,
        };
        if completions.send(PortMessage::Done(completion)).is_err() {
            break;
        }
    }

    if drain_on_close.load(Ordering::Acquire) {
        if let Err(e) = output.drain() {
            log::warn!("Failed to drain PCM playback: {}", e);
        }
    } else if let Err(e) = output.discard() {
        log::warn!("Failed to drop PCM playback: {}", e);
    }
}

/// Write one request in period-sized chunks, checking for abort between them.
///
/// Short writes and XRUNs are retried without losing frames; after
/// `MAX_RECOVERY_RETRIES` consecutive recoveries the request fails.
fn write_request<P: PcmOutput>(
    output: &P,
    samples: &[i16],
    format: OutputFormat,
    abort: &AtomicBool,
) -> Terminal {
    let channels = format.channels;
    let total_frames = samples.len() / channels;
    let mut frames_written = 0;
    let mut retry_count = 0u32;

    while frames_written < total_frames {
        if abort.load(Ordering::Acquire) {
            // Discard whatever is queued in the ring buffer.
            if let Err(e) = output.discard() {
                log::warn!("Failed to drop PCM on abort: {}", e);
            }
            if let Err(e) = output.recover() {
                log::warn!("Failed to prepare PCM after abort: {}", e);
            }
            return Terminal::Aborted;
        }

        let end = (frames_written + format.chunk_frames).min(total_frames);
        match output.write(&samples[frames_written * channels..end * channels]) {
            Ok(n) => {
                frames_written += n;
                retry_count = 0;
            }
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                retry_count += 1;

                if let Err(e2) = output.recover() {
                    log::error!("Failed to recover PCM playback: {}", e2);
                    return Terminal::Failed(SinkError::Write(e2.to_string()));
                }
                if retry_count >= MAX_RECOVERY_RETRIES {
                    log::error!(
                        "Max recovery retries ({}) reached with {} frames unwritten",
                        retry_count,
                        total_frames - frames_written
                    );
                    return Terminal::Failed(SinkError::Write(e.to_string()));
                }
            }
        }
    }

    Terminal::Complete
}

/// Per-channel gain derived from volume and stereo position.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Gain {
    left: f32,
    right: f32,
    channels: usize,
}

impl Gain {
    fn new(volume: f32, position: f32, channels: usize) -> Self {
        let position = position.clamp(0.0, 1.0);
        let (left, right) = if channels == 2 {
            (
                volume * (2.0 * (1.0 - position)).min(1.0),
                volume * (2.0 * position).min(1.0),
            )
        } else {
            (volume, volume)
        };
        Self {
            left,
            right,
            channels: channels.max(1),
        }
    }

    fn is_unity(&self) -> bool {
        self.left == 1.0 && self.right == 1.0
    }

    fn apply(&self, samples: &mut [i16]) {
        if self.is_unity() {
            return;
        }
        for frame in samples.chunks_exact_mut(self.channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let g = if ch % 2 == 0 { self.left } else { self.right };
                *sample = (*sample as f32 * g)
                    .round()
                    .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            }
        }
    }
}
