//! The shared ring page: producer/consumer indices plus the slot array.
//!
//! Layout follows the teacher's `SharedRingBuffer` header (one cache line
//! per atomic field, to keep the frontend's and backend's indices from
//! false-sharing when the page is genuinely shared across address spaces).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, RingError};
use crate::slot::Slot;

/// One cache line per index so front/back never false-share.
#[repr(C, align(64))]
struct PaddedIndex {
    value: AtomicU64,
    _pad: [u8; 56],
}

impl PaddedIndex {
    const fn new(v: u64) -> Self {
        Self { value: AtomicU64::new(v), _pad: [0; 56] }
    }
}

/// The shared indices block (spec §3 "Ring page").
#[repr(C, align(64))]
struct SharedIndices {
    /// Written only by the requester.
    req_prod: PaddedIndex,
    /// Written only by the responder.
    rsp_prod: PaddedIndex,
    /// Threshold at which the requester must notify the responder.
    req_event: PaddedIndex,
    /// Threshold at which the responder must notify the requester.
    rsp_event: PaddedIndex,
}

/// A shared ring page: indices plus a power-of-two array of tagged-union
/// slots. Shared between exactly one frontend and one backend.
pub struct RingPage<Req: Copy + Default, Rsp: Copy + Default> {
    indices: SharedIndices,
    slots: Box<[UnsafeCell<Slot<Req, Rsp>>]>,
    mask: u64,
}

// SAFETY: slot access is mediated by FrontRing/BackRing, which uphold the
// single-writer-per-index discipline the ring protocol requires.
unsafe impl<Req: Copy + Default + Send, Rsp: Copy + Default + Send> Send for RingPage<Req, Rsp> {}
unsafe impl<Req: Copy + Default + Send, Rsp: Copy + Default + Send> Sync for RingPage<Req, Rsp> {}

impl<Req: Copy + Default, Rsp: Copy + Default> RingPage<Req, Rsp> {
    /// Allocate a ring page with `capacity` slots. `capacity` must be a
    /// power of two (spec §3: "ring capacity is `mask = N-1`").
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RingError::config("ring capacity must be a power of 2"));
        }
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(Slot::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            indices: SharedIndices {
                req_prod: PaddedIndex::new(0),
                rsp_prod: PaddedIndex::new(0),
                req_event: PaddedIndex::new(1),
                rsp_event: PaddedIndex::new(1),
            },
            slots,
            mask: (capacity - 1) as u64,
        })
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.mask + 1
    }

    #[inline]
    fn slot(&self, seq: u64) -> &UnsafeCell<Slot<Req, Rsp>> {
        &self.slots[(seq & self.mask) as usize]
    }

    #[inline]
    pub(crate) fn load_req_prod(&self, order: Ordering) -> u64 {
        self.indices.req_prod.value.load(order)
    }
    #[inline]
    pub(crate) fn store_req_prod(&self, v: u64, order: Ordering) {
        self.indices.req_prod.value.store(v, order);
    }
    #[inline]
    pub(crate) fn load_rsp_prod(&self, order: Ordering) -> u64 {
        self.indices.rsp_prod.value.load(order)
    }
    #[inline]
    pub(crate) fn store_rsp_prod(&self, v: u64, order: Ordering) {
        self.indices.rsp_prod.value.store(v, order);
    }
    #[inline]
    pub(crate) fn load_req_event(&self, order: Ordering) -> u64 {
        self.indices.req_event.value.load(order)
    }
    #[inline]
    pub(crate) fn store_req_event(&self, v: u64, order: Ordering) {
        self.indices.req_event.value.store(v, order);
    }
    #[inline]
    pub(crate) fn load_rsp_event(&self, order: Ordering) -> u64 {
        self.indices.rsp_event.value.load(order)
    }
    #[inline]
    pub(crate) fn store_rsp_event(&self, v: u64, order: Ordering) {
        self.indices.rsp_event.value.store(v, order);
    }

    /// # Safety
    /// Caller must hold the sole-writer right for `seq` (i.e. be the
    /// requester writing a not-yet-published request slot, or the
    /// responder overwriting a slot it has already consumed as a
    /// request).
    #[inline]
    pub(crate) unsafe fn write_req(&self, seq: u64, req: Req) {
        (*self.slot(seq).get()).write_req(req);
    }

    /// # Safety
    /// Caller must only call this for a `seq` known to have been
    /// published by the requester (`seq < req_prod`).
    #[inline]
    pub(crate) unsafe fn read_req(&self, seq: u64) -> Req {
        (*self.slot(seq).get()).read_req()
    }

    /// # Safety
    /// Caller must be the responder for this slot, after having consumed
    /// it as a request.
    #[inline]
    pub(crate) unsafe fn write_rsp(&self, seq: u64, rsp: Rsp) {
        (*self.slot(seq).get()).write_rsp(rsp);
    }

    /// # Safety
    /// Caller must only call this for a `seq` known to have been
    /// published by the responder (`seq < rsp_prod`).
    #[inline]
    pub(crate) unsafe fn read_rsp(&self, seq: u64) -> Rsp {
        (*self.slot(seq).get()).read_rsp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        assert!(RingPage::<u64, u64>::new(0).is_err());
        assert!(RingPage::<u64, u64>::new(100).is_err());
        assert!(RingPage::<u64, u64>::new(128).is_ok());
    }
}
