//! Double-buffered decode → submit → swap scheduler.
//!
//! One control flow drives the session. While the sink plays the buffer of
//! request N, the next unit is decoded into the other buffer and submitted
//! linked behind N. Before a buffer is decoded into again, the request that
//! last used it is waited on; that wait is where a break is observed.
//!
//! ```text
//! Idle → Priming → Steady → Draining → Stopped
//!                     └──────┴──────→ Failed | Cancelled
//! ```

use crate::audio::buffer::{BufferPair, SLOTS};
use crate::audio::request::{Completion, PlaybackRequest, RequestId, RequestSlots, Terminal};
use crate::audio::sink::{AudioSink, Rejected, Wake};
use crate::audio::stream_decoder::{DecodedFrame, FrameDecoder};
use crate::error::{PipelineError, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Priming,
    Steady,
    Draining,
    Stopped,
    Failed,
    Cancelled,
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// End of stream reached and everything submitted has played.
    Stopped,
    /// A break was observed; outstanding requests were aborted.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub outcome: Outcome,
    /// Requests submitted to the sink
    pub submitted: u64,
    /// Interleaved samples of requests that completed
    pub samples_played: u64,
}

/// Result of waiting for a slot's request before reusing its buffer.
enum Reclaim {
    Free,
    Break,
}

pub struct Pipeline<D, S> {
    decoder: D,
    sink: S,
    buffers: BufferPair,
    requests: RequestSlots,
    state: PipelineState,
    submitted: u64,
    samples_played: u64,
}

impl<D: FrameDecoder, S: AudioSink> Pipeline<D, S> {
    /// Allocate both buffers up front. Fails with
    /// [`PipelineError::ResourceExhaustion`] before anything is submitted.
    pub fn new(decoder: D, sink: S, buffer_capacity: usize) -> Result<Self, PipelineError> {
        let buffers = BufferPair::allocate(buffer_capacity)?;
        log::debug!("Allocated {} buffers of {} samples", SLOTS, buffer_capacity);
        Ok(Self {
            decoder,
            sink,
            buffers,
            requests: RequestSlots::new(),
            state: PipelineState::Idle,
            submitted: 0,
            samples_played: 0,
        })
    }

    /// Play the stream to the end, to the first error, or to a break.
    ///
    /// Decoder, sink and buffers are released when this returns, on every path.
    pub fn run(mut self) -> Result<SessionReport, PipelineError> {
        let result = self.drive();

        let end = match &result {
            Ok(Outcome::Stopped) => PipelineState::Stopped,
            Ok(Outcome::Cancelled) => PipelineState::Cancelled,
            Err(_) => PipelineState::Failed,
        };
        self.transition(end);
        if end != PipelineState::Stopped {
            self.abort_outstanding();
        }
        self.sink.close(end == PipelineState::Stopped);

        match &result {
            Ok(outcome) => log::info!(
                "Session {:?}: {} requests submitted, {} samples played",
                outcome,
                self.submitted,
                self.samples_played
            ),
            Err(e) => log::error!("Session failed after {} requests: {}", self.submitted, e),
        }

        result.map(|outcome| SessionReport {
            outcome,
            submitted: self.submitted,
            samples_played: self.samples_played,
        })
    }

    fn drive(&mut self) -> Result<Outcome, PipelineError> {
        self.transition(PipelineState::Priming);
        if self.decode_into(0)?.is_end_of_stream() {
            log::info!("Stream is empty, nothing to play");
            return Ok(Outcome::Stopped);
        }
        self.submit(0, None)?;
        self.transition(PipelineState::Steady);

        let mut slot = 0;
        loop {
            slot = (slot + 1) % SLOTS;

            if let Some(id) = self.requests.outstanding(slot) {
                if let Reclaim::Break = self.reclaim(id)? {
                    return Ok(Outcome::Cancelled);
                }
            }

            if self.decode_into(slot)?.is_end_of_stream() {
                break;
            }
            let link = self.requests.latest();
            self.submit(slot, link)?;
        }

        self.transition(PipelineState::Draining);
        for id in self.requests.pending().into_iter().flatten() {
            if let Reclaim::Break = self.reclaim(id)? {
                return Ok(Outcome::Cancelled);
            }
        }
        Ok(Outcome::Stopped)
    }

    fn decode_into(&mut self, slot: usize) -> Result<DecodedFrame, PipelineError> {
        let buffer = self.buffers.home_mut(slot);
        let frame = self
            .decoder
            .decode_next(buffer)
            .map_err(PipelineError::Decode)?;
        debug_assert!(frame.is_end_of_stream() || buffer.len() == frame.interleaved_len());
        Ok(frame)
    }

    fn submit(&mut self, slot: usize, link: Option<RequestId>) -> Result<(), PipelineError> {
        let buffer = self.buffers.take(slot);
        let len = buffer.len();
        match self.sink.submit(buffer, link) {
            Ok(id) => {
                self.requests
                    .occupy(PlaybackRequest::new(id, slot, len, link));
                self.submitted += 1;
                Ok(())
            }
            Err(Rejected { buffer, error }) => {
                self.buffers.restore(buffer);
                Err(PipelineError::SinkSubmit(error))
            }
        }
    }

    /// Wait for `id` to settle so its buffer comes home. Observes breaks.
    fn reclaim(&mut self, id: RequestId) -> Result<Reclaim, PipelineError> {
        match self.sink.wait_or_break(id).map_err(PipelineError::SinkWait)? {
            Wake::Break => {
                log::info!("Break received while waiting for {}", id);
                Ok(Reclaim::Break)
            }
            Wake::Completed(completion) => match self.settle(completion) {
                Some(error) => Err(PipelineError::SinkWait(error)),
                None => Ok(Reclaim::Free),
            },
        }
    }

    /// Record a verdict and take the buffer back. Returns the sink error of a
    /// failed request.
    fn settle(&mut self, completion: Completion) -> Option<SinkError> {
        let Completion {
            id,
            buffer,
            terminal,
        } = completion;
        if self.requests.settle(id, &terminal).is_none() {
            log::warn!("Completion for untracked request {}", id);
        }
        if terminal == Terminal::Complete {
            self.samples_played += buffer.len() as u64;
        }
        self.buffers.restore(buffer);
        match terminal {
            Terminal::Failed(error) => Some(error),
            Terminal::Complete | Terminal::Aborted => None,
        }
    }

    /// Abort everything still outstanding, then wait for each to settle so no
    /// request outlives the buffer it references.
    fn abort_outstanding(&mut self) {
        let pending = self.requests.pending();
        for id in pending.into_iter().flatten() {
            self.sink.abort(id);
        }
        for id in pending.into_iter().flatten() {
            match self.sink.wait(id) {
                Ok(completion) => {
                    if let Some(error) = self.settle(completion) {
                        log::warn!("Request {} failed during teardown: {}", id, error);
                    }
                }
                Err(e) => log::warn!("Request {} did not settle: {}", id, e),
            }
        }
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
