//! Voice slot ledger.
//!
//! A slot is free, playing (mapped to exactly one note), or releasing
//! (still mapped, so a duplicate note-off is blocked, but not yet
//! reusable). Release completion is reported by envelope finish callbacks
//! on the render thread through a bounded channel; every control-domain
//! operation drains the channel first. Recycled slots go to the tail of
//! the free queue, so the earliest-released voice is reused first;
//! initially the queue holds `0..capacity`, lowest index first.
//!
//! Exhaustion drops the new note - no stealing - which keeps allocation
//! deterministic.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::{HashMap, HashSet, VecDeque};

/// Index of a voice slot within a preset.
pub type SlotIdx = usize;

#[derive(Debug)]
pub struct VoiceLedger {
    capacity: usize,
    note_to_slot: HashMap<u8, SlotIdx>,
    free: VecDeque<SlotIdx>,
    releasing: HashSet<SlotIdx>,
    done_tx: Sender<SlotIdx>,
    done_rx: Receiver<SlotIdx>,
}

impl VoiceLedger {
    pub fn new(capacity: usize) -> Self {
        let (done_tx, done_rx) = bounded(capacity.max(1));
        Self {
            capacity,
            note_to_slot: HashMap::with_capacity(capacity),
            free: (0..capacity).collect(),
            releasing: HashSet::with_capacity(capacity),
            done_tx,
            done_rx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sender handed to envelope finish callbacks. `try_send` on a bounded
    /// channel is wait-free, so it is safe on the render thread.
    pub fn completion_sender(&self) -> Sender<SlotIdx> {
        self.done_tx.clone()
    }

    /// Apply any release completions reported since the last call. A
    /// completion for a slot that was retriggered in the meantime is stale
    /// and ignored.
    pub fn drain_completed(&mut self) {
        while let Ok(slot) = self.done_rx.try_recv() {
            self.release_complete(slot);
        }
    }

    /// Slot currently mapped to `note`, playing or releasing.
    pub fn voice_index(&self, note: u8) -> Option<SlotIdx> {
        self.note_to_slot.get(&note).copied()
    }

    pub fn is_releasing(&self, slot: SlotIdx) -> bool {
        self.releasing.contains(&slot)
    }

    /// Claim a slot for `note`. An already-mapped note returns its existing
    /// slot (retrigger) and revokes any pending release; otherwise the head
    /// of the free queue is taken. `None` when the pool is exhausted.
    pub fn take_available(&mut self, note: u8) -> Option<SlotIdx> {
        self.drain_completed();
        if let Some(&slot) = self.note_to_slot.get(&note) {
            self.releasing.remove(&slot);
            return Some(slot);
        }
        let slot = self.free.pop_front()?;
        self.note_to_slot.insert(note, slot);
        Some(slot)
    }

    /// Move `note`'s slot from playing to releasing. The mapping is
    /// retained until the envelope finishes, blocking duplicate note-offs.
    pub fn begin_release(&mut self, note: u8) -> Option<SlotIdx> {
        self.drain_completed();
        let slot = *self.note_to_slot.get(&note)?;
        if !self.releasing.insert(slot) {
            return None; // already releasing
        }
        Some(slot)
    }

    /// Return a released slot to the pool.
    pub fn release_complete(&mut self, slot: SlotIdx) {
        if !self.releasing.remove(&slot) {
            return; // stale completion: the slot was retriggered
        }
        self.note_to_slot.retain(|_, s| *s != slot);
        self.free.push_back(slot);
    }

    /// Notes currently mapped (playing or releasing), unordered.
    pub fn mapped_notes(&self) -> Vec<u8> {
        self.note_to_slot.keys().copied().collect()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }
}
