//! The asynchronous audio sink seam.
//!
//! A sink accepts a buffer, plays it in the background and reports the
//! verdict on a message port. The caller blocks only in `wait`/`wait_or_break`;
//! the break signal (Ctrl-C) is delivered on the same port so a blocked
//! wait wakes up for either event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use super::buffer::{SampleBuffer, SLOTS};
use super::request::{Completion, RequestId};
use crate::error::SinkError;

/// What ended a breakable wait.
#[derive(Debug)]
pub enum Wake {
    Completed(Completion),
    Break,
}

/// A submission the sink refused. The buffer is handed back untouched.
#[derive(Debug)]
pub struct Rejected {
    pub buffer: SampleBuffer,
    pub error: SinkError,
}

pub trait AudioSink {
    /// Queue `buffer` for playback behind `link` without waiting for it to play.
    fn submit(
        &mut self,
        buffer: SampleBuffer,
        link: Option<RequestId>,
    ) -> Result<RequestId, Rejected>;

    /// Block until `id` is terminal. Break signals are not observed.
    fn wait(&mut self, id: RequestId) -> Result<Completion, SinkError>;

    /// Block until `id` is terminal or a break signal arrives.
    fn wait_or_break(&mut self, id: RequestId) -> Result<Wake, SinkError>;

    /// Request early termination of `id`. No effect once it is terminal.
    fn abort(&mut self, id: RequestId);

    /// Release the device. `drain` lets already accepted audio play out.
    fn close(&mut self, drain: bool);
}

pub(crate) enum PortMessage {
    Done(Completion),
    Break,
    /// The producing side went away; nothing else will arrive.
    Gone,
}

/// Raises the break signal on a sink's message port.
#[derive(Clone)]
pub struct Interrupt {
    tx: mpsc::UnboundedSender<PortMessage>,
}

impl Interrupt {
    /// Returns `false` if the session is already over.
    pub fn raise(&self) -> bool {
        self.tx.send(PortMessage::Break).is_ok()
    }
}

/// Receiving end of completions and break signals.
///
/// Completions for other requests than the awaited one are parked until
/// asked for; with two slots at most two can be parked.
pub(crate) struct MessagePort {
    rx: mpsc::UnboundedReceiver<PortMessage>,
    tx: mpsc::UnboundedSender<PortMessage>,
    parked: Vec<Completion>,
    gone: bool,
}

impl MessagePort {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            tx,
            parked: Vec::with_capacity(SLOTS),
            gone: false,
        }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<PortMessage> {
        self.tx.clone()
    }

    pub(crate) fn interrupt(&self) -> Interrupt {
        Interrupt {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn wait(&mut self, id: RequestId) -> Result<Completion, SinkError> {
        loop {
            match self.recv_until(id, false)? {
                Wake::Completed(completion) => return Ok(completion),
                Wake::Break => continue,
            }
        }
    }

    pub(crate) fn wait_or_break(&mut self, id: RequestId) -> Result<Wake, SinkError> {
        self.recv_until(id, true)
    }

    fn recv_until(&mut self, id: RequestId, breakable: bool) -> Result<Wake, SinkError> {
        if let Some(pos) = self.parked.iter().position(|c| c.id == id) {
            return Ok(Wake::Completed(self.parked.swap_remove(pos)));
        }
        if self.gone {
            return Err(SinkError::Disconnected);
        }
        loop {
            match self.rx.blocking_recv() {
                Some(PortMessage::Done(completion)) if completion.id == id => {
                    return Ok(Wake::Completed(completion));
                }
                Some(PortMessage::Done(completion)) => self.parked.push(completion),
                Some(PortMessage::Break) if breakable => return Ok(Wake::Break),
                Some(PortMessage::Break) => {
                    log::debug!("Break ignored while waiting for {} to settle", id);
                }
                Some(PortMessage::Gone) | None => {
                    self.gone = true;
                    return Err(SinkError::Disconnected);
                }
            }
        }
    }
}

/// Abort flags of submitted, not yet retired requests.
#[derive(Debug, Default)]
pub(crate) struct Inflight {
    entries: Vec<(RequestId, Arc<AtomicBool>)>,
}

impl Inflight {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::with_capacity(SLOTS),
        }
    }

    pub(crate) fn register(&mut self, id: RequestId) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.entries.push((id, flag.clone()));
        flag
    }

    pub(crate) fn contains(&self, id: RequestId) -> bool {
        self.entries.iter().any(|(e, _)| *e == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Flag `id` for abort. Returns `true` only the first time.
    pub(crate) fn abort(&mut self, id: RequestId) -> bool {
        match self.entries.iter().find(|(e, _)| *e == id) {
            Some((_, flag)) => !flag.swap(true, Ordering::AcqRel),
            None => false,
        }
    }

    /// Flag every registered request. Returns how many were newly flagged.
    pub(crate) fn abort_all(&mut self) -> usize {
        self.entries
            .iter()
            .filter(|(_, flag)| !flag.swap(true, Ordering::AcqRel))
            .count()
    }

    pub(crate) fn retire(&mut self, id: RequestId) {
        self.entries.retain(|(e, _)| *e != id);
    }
}
