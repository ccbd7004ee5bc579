use crate::{AppError, AppResult};

/// One slot of ingested media.
///
/// The backing slab is allocated once at the slot's capacity and reused for
/// every frame overwritten into the slot; `len` alone says how many bytes of
/// it are the current frame.
#[derive(Debug)]
pub struct Frame {
    data: Box<[u8]>,
    len: usize,
}

impl Frame {
    fn with_capacity(capacity: usize) -> Frame {
        Frame {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes of the frame currently held by this slot.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// Fixed-capacity ring of frame slots with a single write cursor.
///
/// New writes land at `next_write_index` and advance it modulo the capacity,
/// so once the ring is full every write silently overwrites the oldest slot.
/// That is the backpressure policy: a producer ahead of its consumer costs
/// stale frames, never memory growth and never a blocked ingest loop.
///
/// The ring itself does not synchronize readers against the writer; callers
/// that read concurrently with writes must hold the same lock the writer
/// holds (see `IngestContext`).
#[derive(Debug)]
pub struct FrameRing {
    slots: Box<[Frame]>,
    next_write_index: usize,
    slot_capacity: usize,
}

impl FrameRing {
    /// Creates a ring of `slots` pre-allocated frames of `slot_capacity`
    /// bytes each. Neither value can change afterwards.
    pub fn new(slots: usize, slot_capacity: usize) -> FrameRing {
        assert!(slots > 0, "ring must have at least one slot");
        let slots = (0..slots)
            .map(|_| Frame::with_capacity(slot_capacity))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        FrameRing {
            slots,
            next_write_index: 0,
            slot_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    /// The slot the next write will land in.
    pub fn next_write_index(&self) -> usize {
        self.next_write_index
    }

    /// Overwrites the slot at the write cursor and advances the cursor.
    ///
    /// Payloads larger than the slot capacity are rejected before any byte
    /// is copied, leaving the slot and the cursor untouched.
    pub fn write(&mut self, payload: &[u8]) -> AppResult<usize> {
        if payload.len() > self.slot_capacity {
            return Err(AppError::OversizedPayload {
                length: payload.len(),
                capacity: self.slot_capacity,
            });
        }
        let index = self.next_write_index;
        let slot = &mut self.slots[index];
        slot.data[..payload.len()].copy_from_slice(payload);
        slot.len = payload.len();
        self.next_write_index = (index + 1) % self.slots.len();
        Ok(index)
    }

    /// Consumer-side access to a slot. The ring offers no freshness metadata
    /// beyond `next_write_index`; the caller decides which slots are live.
    pub fn frame(&self, index: usize) -> &Frame {
        &self.slots[index]
    }
}
