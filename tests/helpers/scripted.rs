//! Scripted in-memory decoder and sink
//!
//! Both doubles append to one shared [`Journal`] so a test can assert on the
//! exact interleaving of decode, submit, wait, abort and close calls.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mp3play::audio::{
    AudioSink, Completion, DecodedFrame, FrameDecoder, Rejected, RequestId, SampleBuffer,
    Terminal, Wake,
};
use mp3play::{DecodeError, SinkError};

pub const TEST_CHANNELS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Decode { slot: usize },
    Submit { id: u64, slot: usize, link: Option<u64>, len: usize },
    Reject { slot: usize },
    Wait { id: u64, breakable: bool },
    Abort { id: u64 },
    Close { drain: bool },
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Event>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn submits(&self) -> Vec<Event> {
        self.filter(|e| matches!(e, Event::Submit { .. }))
    }

    pub fn waits(&self) -> Vec<Event> {
        self.filter(|e| matches!(e, Event::Wait { .. }))
    }

    pub fn aborts(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Abort { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn decodes(&self) -> usize {
        self.filter(|e| matches!(e, Event::Decode { .. })).len()
    }

    fn filter(&self, keep: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.0.borrow().iter().filter(|e| keep(e)).cloned().collect()
    }
}

/// A break raised outside any wait, seen at the sink's next breakable wait.
#[derive(Debug, Clone, Default)]
pub struct PendingBreak(Rc<Cell<bool>>);

impl PendingBreak {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.set(true);
    }

    pub fn take(&self) -> bool {
        self.0.replace(false)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// One unit of this many frames
    Frame(usize),
    Fail,
}

/// Decoder that plays back a fixed script, then reports end of stream.
///
/// Unit `n` (1-based) is filled with the sample value `n`.
pub struct ScriptedDecoder {
    script: Vec<Step>,
    next: usize,
    journal: Journal,
    break_during: Option<(usize, PendingBreak)>,
}

impl ScriptedDecoder {
    pub fn new(script: Vec<Step>, journal: Journal) -> Self {
        Self {
            script,
            next: 0,
            journal,
            break_during: None,
        }
    }

    /// Raise `signal` while decoding unit `unit` (1-based).
    pub fn with_break_during(mut self, unit: usize, signal: PendingBreak) -> Self {
        self.break_during = Some((unit, signal));
        self
    }

    /// `units` units of `frames` frames each.
    pub fn uniform(units: usize, frames: usize, journal: Journal) -> Self {
        Self::new(vec![Step::Frame(frames); units], journal)
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode_next(&mut self, target: &mut SampleBuffer) -> Result<DecodedFrame, DecodeError> {
        self.journal.push(Event::Decode {
            slot: target.slot(),
        });
        target.clear();

        let Some(step) = self.script.get(self.next).copied() else {
            return Ok(DecodedFrame::end_of_stream());
        };
        self.next += 1;
        if let Some((unit, signal)) = &self.break_during {
            if *unit == self.next {
                signal.raise();
            }
        }

        match step {
            Step::Fail => Err(DecodeError::Corrupt(format!("unit {}", self.next))),
            Step::Frame(frames) => {
                let len = frames * TEST_CHANNELS;
                target.spare_mut()[..len].fill(self.next as i16);
                target.set_len(len);
                Ok(DecodedFrame {
                    samples: frames,
                    channels: TEST_CHANNELS,
                })
            }
        }
    }
}

struct Held {
    id: RequestId,
    buffer: SampleBuffer,
    aborted: bool,
}

/// Sink that completes every request as soon as it is waited on.
#[derive(Default)]
pub struct ScriptedSink {
    journal: Journal,
    held: Vec<Held>,
    next_id: u64,
    breakable_waits: usize,
    /// Deliver a break on this breakable wait (1-based)
    pub break_on_wait: Option<usize>,
    /// Report the request of this breakable wait (1-based) as failed
    pub fail_wait_on: Option<usize>,
    /// Reject this submission (1-based)
    pub reject_submit_on: Option<u64>,
    /// Break raised elsewhere, delivered at the next breakable wait
    pub pending_break: PendingBreak,
    /// Most buffers ever held at once
    pub max_depth: Rc<RefCell<usize>>,
}

impl ScriptedSink {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    fn settle(&mut self, id: RequestId, terminal: Terminal) -> Result<Completion, SinkError> {
        let pos = self
            .held
            .iter()
            .position(|h| h.id == id)
            .ok_or(SinkError::UnknownRequest(id))?;
        let held = self.held.remove(pos);
        let terminal = if held.aborted { Terminal::Aborted } else { terminal };
        Ok(Completion {
            id,
            buffer: held.buffer,
            terminal,
        })
    }
}

impl AudioSink for ScriptedSink {
    fn submit(
        &mut self,
        buffer: SampleBuffer,
        link: Option<RequestId>,
    ) -> Result<RequestId, Rejected> {
        if self.reject_submit_on == Some(self.next_id + 1) {
            self.journal.push(Event::Reject {
                slot: buffer.slot(),
            });
            return Err(Rejected {
                buffer,
                error: SinkError::Submit("scripted rejection".to_string()),
            });
        }

        self.next_id += 1;
        let id = RequestId::new(self.next_id);
        self.journal.push(Event::Submit {
            id: id.get(),
            slot: buffer.slot(),
            link: link.map(RequestId::get),
            len: buffer.len(),
        });
        self.held.push(Held {
            id,
            buffer,
            aborted: false,
        });
        let mut max_depth = self.max_depth.borrow_mut();
        *max_depth = (*max_depth).max(self.held.len());
        Ok(id)
    }

    fn wait(&mut self, id: RequestId) -> Result<Completion, SinkError> {
        self.journal.push(Event::Wait {
            id: id.get(),
            breakable: false,
        });
        self.settle(id, Terminal::Complete)
    }

    fn wait_or_break(&mut self, id: RequestId) -> Result<Wake, SinkError> {
        self.journal.push(Event::Wait {
            id: id.get(),
            breakable: true,
        });
        self.breakable_waits += 1;

        if self.pending_break.take() || self.break_on_wait == Some(self.breakable_waits) {
            return Ok(Wake::Break);
        }
        let terminal = if self.fail_wait_on == Some(self.breakable_waits) {
            Terminal::Failed(SinkError::Write("scripted underrun".to_string()))
        } else {
            Terminal::Complete
        };
        self.settle(id, terminal).map(Wake::Completed)
    }

    fn abort(&mut self, id: RequestId) {
        self.journal.push(Event::Abort { id: id.get() });
        if let Some(held) = self.held.iter_mut().find(|h| h.id == id) {
            held.aborted = true;
        }
    }

    fn close(&mut self, drain: bool) {
        self.journal.push(Event::Close { drain });
    }
}
