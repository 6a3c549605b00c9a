//! The hypervisor boundary the backend drives for mapping guest pages
//! and flipping host packets into guest memory (spec §1 "out of
//! scope": actual grant-map/MMU hypercalls). Mirrors
//! `xsplit_grant::GrantHypercalls` / `xsplit_netfront::NetFrontHypercalls`
//! on the backend side of the same boundary.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The (domid, grant_ref) pair names no active grant - spec §8
    /// scenario S6, an unallocated or already-consumed reference.
    BadGrantRef,
}

pub trait NetBackHypercalls: Send + Sync {
    /// Map up to `MAX_BATCH` (domid, grant_ref) pairs read-only into the
    /// backend's reserved virtual address window, in one hypercall
    /// (spec §4.7 step 4). One result per input pair, in order.
    fn map_foreign_pages_batch(&self, grants: &[(u32, u16)]) -> Vec<Result<u64, MapError>>;

    /// Unmap previously mapped frames, batched (spec §4.7 "Completion").
    fn unmap_batch(&self, frames: &[u64]);

    /// Whether `frame` is already backend slab-allocated and not shared
    /// with another domain (spec §4.8 step 2).
    fn is_slab_private(&self, frame: u64) -> bool;

    /// Copy a packet's data out of `frame` into a fresh slab-allocated
    /// buffer, returning the new frame (spec §4.8 step 2 fallback).
    fn copy_into_slab(&self, frame: u64) -> u64;

    /// Reserve up to `n` fresh machine frames via a bulk
    /// reservation-increase hypercall (spec §4.8 step 3, "cache of up
    /// to 64 frames per backend").
    fn reserve_frames(&self, n: usize) -> Vec<u64>;

    /// Run the RX multicall: atomically with respect to TLB flushing,
    /// update the guest's p2m entry for `page` to `new_frame`, reassign
    /// `old_frame` (the one holding packet data) to `domid`, and patch
    /// the guest's kernel mapping, flushing the TLB at the end of the
    /// batch (spec §4.8 step 4). Returns whether the reassign step
    /// succeeded; on failure the caller returns `old_frame` to the
    /// frame cache and produces an error response.
    fn rx_multicall(&self, domid: u32, page: u64, new_frame: u64, old_frame: u64) -> bool;
}

/// In-memory simulation for tests and for running frontend/backend
/// pairs in a single process.
pub mod sim {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use parking_lot::Mutex;

    use super::{MapError, NetBackHypercalls};

    #[derive(Default)]
    pub struct SimNetBackHypervisor {
        granted: Mutex<HashMap<(u32, u16), u64>>,
        next_frame: AtomicU64,
        fail_next_reassign: AtomicBool,
    }

    impl SimNetBackHypervisor {
        pub fn new() -> Self {
            Self { next_frame: AtomicU64::new(0x10_000), ..Default::default() }
        }

        /// Register a grant the frontend issued, as if the grant table
        /// hypercall had already validated it.
        pub fn register_grant(&self, domid: u32, grant_ref: u16, frame: u64) {
            self.granted.lock().insert((domid, grant_ref), frame);
        }

        pub fn fail_next_reassign(&self) {
            self.fail_next_reassign.store(true, Ordering::Relaxed);
        }
    }

    impl NetBackHypercalls for SimNetBackHypervisor {
        fn map_foreign_pages_batch(&self, grants: &[(u32, u16)]) -> Vec<Result<u64, MapError>> {
            let table = self.granted.lock();
            grants
                .iter()
                .map(|key| table.get(key).copied().ok_or(MapError::BadGrantRef))
                .collect()
        }

        fn unmap_batch(&self, _frames: &[u64]) {}

        fn is_slab_private(&self, _frame: u64) -> bool {
            true
        }

        fn copy_into_slab(&self, frame: u64) -> u64 {
            frame
        }

        fn reserve_frames(&self, n: usize) -> Vec<u64> {
            (0..n).map(|_| self.next_frame.fetch_add(1, Ordering::Relaxed)).collect()
        }

        fn rx_multicall(&self, _domid: u32, _page: u64, _new_frame: u64, _old_frame: u64) -> bool {
            !self.fail_next_reassign.swap(false, Ordering::Relaxed)
        }
    }
}
