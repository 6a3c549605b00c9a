//! The backend's pending-index ring: 256 entries, power-of-two sized
//! so indices are mask-addressed rather than compared with `<` (spec
//! §4.7 step 3, §8 "Ring wrap ... use mask indexing"). A second,
//! channel-backed ring carries indices back from the host stack's
//! packet destructor to the tasklet that freed them (spec §4.7
//! "Completion").

use crossbeam_channel::{unbounded, Receiver, Sender};

pub const PENDING_RING_SIZE: usize = 256;
const PENDING_RING_MASK: u16 = (PENDING_RING_SIZE - 1) as u16;

/// What a pending slot remembers about the in-flight guest packet it
/// was allocated for.
#[derive(Debug, Clone, Copy)]
pub struct PendingEntry {
    pub interface: u32,
    pub req_id: u16,
    pub mapped_frame: u64,
}

pub struct PendingRing {
    slots: Vec<Option<PendingEntry>>,
    free: Vec<u16>,
}

impl PendingRing {
    pub fn new() -> Self {
        Self {
            slots: vec![None; PENDING_RING_SIZE],
            free: (0..PENDING_RING_SIZE as u16).rev().collect(),
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn alloc(&mut self, entry: PendingEntry) -> Option<u16> {
        let idx = self.free.pop()?;
        self.slots[(idx & PENDING_RING_MASK) as usize] = Some(entry);
        Some(idx)
    }

    pub fn get(&self, idx: u16) -> Option<&PendingEntry> {
        self.slots[(idx & PENDING_RING_MASK) as usize].as_ref()
    }

    pub fn get_mut(&mut self, idx: u16) -> Option<&mut PendingEntry> {
        self.slots[(idx & PENDING_RING_MASK) as usize].as_mut()
    }

    /// Return `idx` to the free list, yielding the entry it held. A
    /// slot may only be freed once; freeing an already-free slot is a
    /// caller bug and is ignored rather than corrupting the free list.
    pub fn dealloc(&mut self, idx: u16) -> Option<PendingEntry> {
        let slot = self.slots[(idx & PENDING_RING_MASK) as usize].take();
        if slot.is_some() {
            self.free.push(idx);
        }
        slot
    }
}

impl Default for PendingRing {
    fn default() -> Self {
        Self::new()
    }
}

/// The deallocation ring: the host stack's packet destructor pushes a
/// pending index here when it drops the packet; the TX tasklet drains
/// it in the same pass it maps new requests (spec §4.7 "Completion").
pub struct DeallocRing {
    tx: Sender<u16>,
    rx: Receiver<u16>,
}

impl DeallocRing {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A clonable handle the packet destructor closure captures.
    pub fn completion_sender(&self) -> Sender<u16> {
        self.tx.clone()
    }

    pub fn drain(&self) -> Vec<u16> {
        self.rx.try_iter().collect()
    }
}

impl Default for DeallocRing {
    fn default() -> Self {
        Self::new()
    }
}
