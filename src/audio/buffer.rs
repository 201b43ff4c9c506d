//! The two fixed-capacity interleaved PCM buffers of a session.
//!
//! A buffer is either home in its [`BufferPair`] slot (idle or being filled)
//! or owned by the sink while its request is in flight. Because ownership
//! moves with the buffer, a buffer cannot be decoded into while it plays.

use crate::error::PipelineError;

/// Number of buffers (and request slots) in a session.
pub const SLOTS: usize = 2;

/// Fixed-capacity container of interleaved signed 16-bit samples.
#[derive(Debug)]
pub struct SampleBuffer {
    slot: usize,
    data: Vec<i16>,
    len: usize,
}

impl SampleBuffer {
    /// Allocate a zeroed buffer of `capacity` samples for `slot`.
    ///
    /// The storage is reserved exactly once; it is never grown afterwards.
    pub fn allocate(slot: usize, capacity: usize) -> Result<Self, PipelineError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| PipelineError::ResourceExhaustion {
                slot,
                requested: capacity,
            })?;
        data.resize(capacity, 0);
        Ok(Self { slot, data, len: 0 })
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Samples currently in use.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.data[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.data[..self.len]
    }

    /// The whole capacity, for a decoder to fill before calling [`set_len`](Self::set_len).
    pub fn spare_mut(&mut self) -> &mut [i16] {
        &mut self.data
    }

    pub fn set_len(&mut self, len: usize) {
        assert!(
            len <= self.data.len(),
            "buffer {}: length {} exceeds capacity {}",
            self.slot,
            len,
            self.data.len()
        );
        self.len = len;
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Owner of both session buffers while they are not in flight.
#[derive(Debug)]
pub struct BufferPair {
    slots: [Option<SampleBuffer>; SLOTS],
    capacity: usize,
}

impl BufferPair {
    pub fn allocate(capacity: usize) -> Result<Self, PipelineError> {
        let a = SampleBuffer::allocate(0, capacity)?;
        let b = SampleBuffer::allocate(1, capacity)?;
        Ok(Self {
            slots: [Some(a), Some(b)],
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the buffer of `slot` is home (not owned by an in-flight request).
    #[cfg(test)]
    fn is_home(&self, slot: usize) -> bool {
        self.slots[slot].is_some()
    }

    /// Buffers currently owned by the sink.
    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.slots.iter().filter(|b| b.is_none()).count()
    }

    /// Borrow the buffer of `slot` for filling.
    ///
    /// Panics if the buffer is in flight: reusing it before its request has
    /// settled breaks the depth-2 invariant.
    pub fn home_mut(&mut self, slot: usize) -> &mut SampleBuffer {
        match self.slots[slot].as_mut() {
            Some(buffer) => buffer,
            None => panic!("buffer {} reused while still in flight", slot),
        }
    }

    /// Hand the buffer of `slot` out to the sink.
    pub fn take(&mut self, slot: usize) -> SampleBuffer {
        match self.slots[slot].take() {
            Some(buffer) => buffer,
            None => panic!("buffer {} submitted twice", slot),
        }
    }

    /// Return a buffer to its slot once its request is terminal.
    pub fn restore(&mut self, buffer: SampleBuffer) {
        let slot = buffer.slot();
        assert!(self.slots[slot].is_none(), "buffer {} restored twice", slot);
        self.slots[slot] = Some(buffer);
    }
}
