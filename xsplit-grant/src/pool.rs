//! A per-direction pool of grant references, sized to
//! `ring_slots * max_segments_per_request + 1` (spec §3 "Lifecycle").

use crate::error::{GrantError, Result};

/// A free list of grant references claimed from the global table for one
/// direction (e.g. one block ring's segments, or one netfront's RX
/// buffers).
pub struct Pool {
    free: Vec<u16>,
    capacity: usize,
}

impl Pool {
    pub(crate) fn new(refs: Vec<u16>) -> Self {
        let capacity = refs.len();
        Self { free: refs, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Remove the head of the free list (spec §4.2 `claim`).
    pub fn claim(&mut self) -> Result<u16> {
        self.free.pop().ok_or(GrantError::PoolEmpty)
    }

    /// Push a reference back onto the free list (spec §4.2 `release`).
    /// Idempotence is forbidden: releasing a reference already in the
    /// free list is a fault.
    pub fn release(&mut self, grant_ref: u16) -> Result<()> {
        if self.free.contains(&grant_ref) {
            return Err(GrantError::DoubleRelease(grant_ref));
        }
        self.free.push(grant_ref);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_and_release_cycle() {
        let mut pool = Pool::new(vec![1, 2, 3]);
        assert_eq!(pool.available(), 3);
        let r = pool.claim().unwrap();
        assert_eq!(pool.available(), 2);
        pool.release(r).unwrap();
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn double_release_is_a_fault() {
        let mut pool = Pool::new(vec![1, 2]);
        let r = pool.claim().unwrap();
        pool.release(r).unwrap();
        assert_eq!(pool.release(r), Err(GrantError::DoubleRelease(r)));
    }

    #[test]
    fn empty_pool_fails_claim() {
        let mut pool = Pool::new(vec![]);
        assert_eq!(pool.claim(), Err(GrantError::PoolEmpty));
    }
}
