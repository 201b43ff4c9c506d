//! Playback request tracking.
//!
//! A request is one asynchronous submission of a [`SampleBuffer`] to the
//! sink. The session keeps exactly two request slots, one per buffer; a slot
//! is only reoccupied once its previous request reached a terminal state.

use std::fmt;

use super::buffer::{SampleBuffer, SLOTS};
use crate::error::SinkError;

/// Identity of a submitted request. Ids increase monotonically per sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Complete,
    Aborted,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

/// How a request ended, as reported by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Complete,
    Aborted,
    Failed(SinkError),
}

impl Terminal {
    pub fn state(&self) -> RequestState {
        match self {
            Terminal::Complete => RequestState::Complete,
            Terminal::Aborted => RequestState::Aborted,
            Terminal::Failed(_) => RequestState::Failed,
        }
    }
}

/// A settled request: its buffer comes back together with the verdict.
#[derive(Debug)]
pub struct Completion {
    pub id: RequestId,
    pub buffer: SampleBuffer,
    pub terminal: Terminal,
}

#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    id: RequestId,
    slot: usize,
    samples: usize,
    link: Option<RequestId>,
    state: RequestState,
}

impl PlaybackRequest {
    pub fn new(id: RequestId, slot: usize, samples: usize, link: Option<RequestId>) -> Self {
        Self {
            id,
            slot,
            samples,
            link,
            state: RequestState::Pending,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Buffer slot the request plays.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Interleaved samples submitted.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Request this one is chained behind, `None` for the first of a session.
    pub fn link(&self) -> Option<RequestId> {
        self.link
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn settle(&mut self, terminal: &Terminal) {
        debug_assert!(
            !self.state.is_terminal(),
            "request {} settled twice",
            self.id
        );
        self.state = terminal.state();
    }
}

/// The two request slots of a session, indexed by buffer slot.
#[derive(Debug, Default)]
pub struct RequestSlots {
    slots: [Option<PlaybackRequest>; SLOTS],
    latest: Option<RequestId>,
}

impl RequestSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly submitted request in the slot of its buffer.
    ///
    /// Panics if the slot still holds a pending request.
    pub fn occupy(&mut self, request: PlaybackRequest) {
        let slot = request.slot();
        if let Some(previous) = &self.slots[slot] {
            assert!(
                previous.state().is_terminal(),
                "request {} overwritten while {:?}",
                previous.id(),
                previous.state()
            );
        }
        self.latest = Some(request.id());
        self.slots[slot] = Some(request);
    }

    pub fn get(&self, slot: usize) -> Option<&PlaybackRequest> {
        self.slots[slot].as_ref()
    }

    /// Pending request occupying `slot`, if any.
    pub fn outstanding(&self, slot: usize) -> Option<RequestId> {
        self.slots[slot]
            .as_ref()
            .filter(|r| !r.state().is_terminal())
            .map(|r| r.id())
    }

    /// Most recently submitted request, the link target of the next one.
    pub fn latest(&self) -> Option<RequestId> {
        self.latest
    }

    /// Pending requests in submission order.
    pub fn pending(&self) -> [Option<RequestId>; SLOTS] {
        let mut ids = [self.outstanding(0), self.outstanding(1)];
        ids.sort_by_key(|id| id.map_or(u64::MAX, RequestId::get));
        ids
    }

    /// Apply a sink verdict. Returns the request's slot, or `None` if no slot
    /// holds a pending request with this id.
    pub fn settle(&mut self, id: RequestId, terminal: &Terminal) -> Option<usize> {
        let request = self
            .slots
            .iter_mut()
            .flatten()
            .find(|r| r.id() == id && !r.state().is_terminal())?;
        request.settle(terminal);
        Some(request.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> RequestId {
        RequestId::new(raw)
    }

    #[test]
    fn terminal_states() {
        assert!(!RequestState::Pending.is_terminal());
        assert!(RequestState::Complete.is_terminal());
        assert!(RequestState::Aborted.is_terminal());
        assert!(RequestState::Failed.is_terminal());
        assert_eq!(
            Terminal::Failed(SinkError::Disconnected).state(),
            RequestState::Failed
        );
    }

    #[test]
    fn slots_track_latest_and_outstanding() {
        let mut slots = RequestSlots::new();
        assert_eq!(slots.latest(), None);

        slots.occupy(PlaybackRequest::new(id(1), 0, 2304, None));
        slots.occupy(PlaybackRequest::new(id(2), 1, 2304, Some(id(1))));

        assert_eq!(slots.latest(), Some(id(2)));
        assert_eq!(slots.outstanding(0), Some(id(1)));
        assert_eq!(slots.get(1).and_then(PlaybackRequest::link), Some(id(1)));
        assert_eq!(slots.pending(), [Some(id(1)), Some(id(2))]);
    }

    #[test]
    fn outstanding_order_follows_submission_not_slot() {
        let mut slots = RequestSlots::new();
        slots.occupy(PlaybackRequest::new(id(1), 0, 4, None));
        slots.occupy(PlaybackRequest::new(id(2), 1, 4, Some(id(1))));
        assert_eq!(slots.settle(id(1), &Terminal::Complete), Some(0));
        slots.occupy(PlaybackRequest::new(id(3), 0, 4, Some(id(2))));

        assert_eq!(slots.pending(), [Some(id(2)), Some(id(3))]);

        slots.settle(id(2), &Terminal::Aborted);
        assert_eq!(slots.pending(), [Some(id(3)), None]);
        assert_eq!(slots.get(1).map(PlaybackRequest::state), Some(RequestState::Aborted));
    }

    #[test]
    fn settle_ignores_unknown_or_settled_ids() {
        let mut slots = RequestSlots::new();
        slots.occupy(PlaybackRequest::new(id(7), 1, 4, None));
        assert_eq!(slots.settle(id(8), &Terminal::Complete), None);
        assert_eq!(slots.settle(id(7), &Terminal::Complete), Some(1));
        assert_eq!(slots.settle(id(7), &Terminal::Complete), None);
        assert_eq!(slots.outstanding(1), None);
    }

    #[test]
    #[should_panic(expected = "overwritten")]
    fn pending_slot_cannot_be_reoccupied() {
        let mut slots = RequestSlots::new();
        slots.occupy(PlaybackRequest::new(id(1), 0, 4, None));
        slots.occupy(PlaybackRequest::new(id(3), 0, 4, Some(id(1))));
    }
}
