//! The frontend's private shadow ring (spec §3 "Block shadow slot",
//! §4.5). Mirrors every in-flight request so it can be released and,
//! after a reset, replayed with fresh grant references.

use crate::error::{BlkError, Result};
use crate::wire::BlockOp;

/// End-of-free-list marker, threaded through unused slots' link field
/// (spec §3: "the free list of shadow slots is a linked list threaded
/// through the `id` field of unused slots").
pub const SENTINEL: u64 = u64::MAX;

/// One pickled buffer segment: the frontend-private record needed to
/// re-grant it after a reset (spec §4.5 recovery step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickledSegment {
    pub grant_ref: u16,
    pub frame: u64,
    pub first_sector: u8,
    pub last_sector: u8,
}

/// The frontend-private encoding of an in-flight request (spec
/// GLOSSARY "Pickling"), sufficient to recreate it - including its
/// original grant-reference identity - after a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickledRequest {
    pub client_id: u64,
    pub op: BlockOp,
    pub device: u16,
    pub sector: u64,
    pub segments: Vec<PickledSegment>,
}

struct ShadowSlot {
    next_free: u64,
    occupied: Option<PickledRequest>,
}

/// The shadow ring: `N` slots, free-listed by index.
pub struct ShadowRing {
    slots: Vec<ShadowSlot>,
    free_head: u64,
}

impl ShadowRing {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|i| {
                let next = if i + 1 == capacity { SENTINEL } else { (i + 1) as u64 };
                ShadowSlot { next_free: next, occupied: None }
            })
            .collect();
        Self { slots, free_head: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocate a shadow id from the free list (spec §4.5 step 1).
    pub fn alloc(&mut self) -> Result<u64> {
        if self.free_head == SENTINEL {
            return Err(BlkError::ShadowExhausted);
        }
        let id = self.free_head;
        self.free_head = self.slots[id as usize].next_free;
        Ok(id)
    }

    /// Record the pickled form of the request occupying `id`.
    pub fn occupy(&mut self, id: u64, request: PickledRequest) {
        self.slots[id as usize].occupied = Some(request);
    }

    pub fn get(&self, id: u64) -> Option<&PickledRequest> {
        self.slots.get(id as usize).and_then(|s| s.occupied.as_ref())
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut PickledRequest> {
        self.slots.get_mut(id as usize).and_then(|s| s.occupied.as_mut())
    }

    /// Release `id` back to the free list, returning the request it
    /// held (spec §4.5 completion: "returns the shadow id to the free
    /// list").
    pub fn release(&mut self, id: u64) -> Option<PickledRequest> {
        let slot = self.slots.get_mut(id as usize)?;
        let taken = slot.occupied.take();
        slot.next_free = self.free_head;
        self.free_head = id;
        taken
    }

    pub fn is_occupied(&self, id: u64) -> bool {
        self.slots.get(id as usize).map(|s| s.occupied.is_some()).unwrap_or(false)
    }

    /// Snapshot every occupied slot (recovery step 1: "Snapshot the
    /// shadow ring"), in ascending id order for determinism.
    pub fn snapshot_occupied(&self) -> Vec<(u64, PickledRequest)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.occupied.as_ref().map(|r| (i as u64, r.clone())))
            .collect()
    }

    /// Reinitialise the free list as `shadow[i].id = i+1` with a
    /// sentinel on the last slot, clearing all occupied state (recovery
    /// step 1, second half).
    pub fn reinit_free_list(&mut self) {
        let capacity = self.slots.len();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.occupied = None;
            slot.next_free = if i + 1 == capacity { SENTINEL } else { (i + 1) as u64 };
        }
        self.free_head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(client_id: u64) -> PickledRequest {
        PickledRequest {
            client_id,
            op: BlockOp::Write,
            device: 1,
            sector: 100,
            segments: vec![PickledSegment { grant_ref: 5, frame: 0xAAAA, first_sector: 0, last_sector: 7 }],
        }
    }

    #[test]
    fn alloc_occupy_release_cycle() {
        let mut ring = ShadowRing::new(4);
        let id = ring.alloc().unwrap();
        ring.occupy(id, req(42));
        assert!(ring.is_occupied(id));

        let released = ring.release(id).unwrap();
        assert_eq!(released.client_id, 42);
        assert!(!ring.is_occupied(id));

        // The slot is reusable immediately.
        let id2 = ring.alloc().unwrap();
        assert_eq!(id2, id);
    }

    #[test]
    fn exhausted_free_list_fails() {
        let mut ring = ShadowRing::new(2);
        ring.alloc().unwrap();
        ring.alloc().unwrap();
        assert_eq!(ring.alloc(), Err(BlkError::ShadowExhausted));
    }

    #[test]
    fn snapshot_then_reinit_clears_occupancy() {
        let mut ring = ShadowRing::new(4);
        let a = ring.alloc().unwrap();
        ring.occupy(a, req(1));
        let b = ring.alloc().unwrap();
        ring.occupy(b, req(2));

        let snapshot = ring.snapshot_occupied();
        assert_eq!(snapshot.len(), 2);

        ring.reinit_free_list();
        assert!(!ring.is_occupied(a));
        assert!(!ring.is_occupied(b));
        for _ in 0..4 {
            ring.alloc().unwrap();
        }
        assert_eq!(ring.alloc(), Err(BlkError::ShadowExhausted));
    }
}
