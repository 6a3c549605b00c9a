//! The grant table client: reserves reference numbers, tracks their
//! granted/invalid state, and drives the hypervisor boundary (spec §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{GrantError, Result};
use crate::hypervisor::GrantHypercalls;
use crate::pool::Pool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// Claimed from a pool but not yet granted to any remote domain.
    Claimed,
    Access { remote_domid: u32, frame: u64, write_ok: bool },
    Transfer { remote_domid: u32, frame: u64 },
    /// The underlying permission may have been lost (post suspend/resume)
    /// and must be re-established before reuse (spec §3 "Grant reference").
    Invalid { remote_domid: u32, frame: u64 },
}

/// Issues and tracks grant references, calling through to the hypervisor
/// boundary (`GrantHypercalls`) for the actual permission records.
pub struct GrantClient<H: GrantHypercalls> {
    hv: Arc<H>,
    next_ref: Mutex<u16>,
    state: Mutex<HashMap<u16, RefState>>,
}

impl<H: GrantHypercalls> GrantClient<H> {
    pub fn new(hv: Arc<H>) -> Self {
        Self { hv, next_ref: Mutex::new(1), state: Mutex::new(HashMap::new()) }
    }

    /// Allocate `n` fresh reference numbers from the global space and
    /// link them into a pool's free list (spec §4.2 `alloc_pool`).
    pub fn alloc_pool(&self, n: usize) -> Result<Pool> {
        if n == 0 {
            return Err(GrantError::config("pool size must be > 0"));
        }
        let mut next = self.next_ref.lock();
        if (*next as usize).saturating_add(n) > u16::MAX as usize {
            return Err(GrantError::NoSpace);
        }
        let refs: Vec<u16> = (*next..*next + n as u16).collect();
        *next += n as u16;
        Ok(Pool::new(refs))
    }

    /// Install a read-only or read-write access grant for `grant_ref`
    /// (spec §4.2 `grant_foreign_access`). Valid from `Claimed` or
    /// `Invalid` (post-resume re-grant).
    pub fn grant_foreign_access(
        &self,
        grant_ref: u16,
        remote_domid: u32,
        frame: u64,
        write_ok: bool,
    ) {
        self.hv.install_access(grant_ref, remote_domid, frame, write_ok);
        self.state
            .lock()
            .insert(grant_ref, RefState::Access { remote_domid, frame, write_ok });
    }

    /// Permit `remote_domid` to take ownership of `frame` exactly once
    /// (spec §4.2 `grant_foreign_transfer`).
    pub fn grant_foreign_transfer(&self, grant_ref: u16, remote_domid: u32, frame: u64) {
        self.hv.install_transfer(grant_ref, remote_domid, frame);
        self.state.lock().insert(grant_ref, RefState::Transfer { remote_domid, frame });
    }

    /// Revoke an access grant. If the remote domain still holds the
    /// mapping, returns `Err(StillMapped)` - the caller must retry or
    /// call `mark_invalid` (spec §4.2 `end_foreign_access`).
    pub fn end_foreign_access(&self, grant_ref: u16, was_readonly: bool) -> Result<()> {
        let revoked = self.hv.revoke_access(grant_ref, was_readonly);
        if !revoked {
            return Err(GrantError::StillMapped(grant_ref));
        }
        self.state.lock().remove(&grant_ref);
        Ok(())
    }

    /// Wait (via a bounded poll loop - no packet/request-path call may
    /// block indefinitely per spec §5) for the transfer to be consumed,
    /// and return the frame the remote domain gave back (spec §4.2
    /// `end_foreign_transfer`).
    pub fn end_foreign_transfer(&self, grant_ref: u16) -> Result<u64> {
        match self.hv.poll_transfer_consumed(grant_ref) {
            Some(frame) => {
                self.state.lock().remove(&grant_ref);
                Ok(frame)
            }
            None => Err(GrantError::NotGranted(grant_ref)),
        }
    }

    /// Mark a reference `INVALID`: its underlying permission may have
    /// been lost across suspend/resume and must be re-established before
    /// the request that used it is replayed (spec §4.2 `mark_invalid`).
    pub fn mark_invalid(&self, grant_ref: u16) {
        let mut state = self.state.lock();
        let invalid = match state.get(&grant_ref) {
            Some(RefState::Access { remote_domid, frame, .. }) => {
                Some(RefState::Invalid { remote_domid: *remote_domid, frame: *frame })
            }
            Some(RefState::Transfer { remote_domid, frame }) => {
                Some(RefState::Invalid { remote_domid: *remote_domid, frame: *frame })
            }
            _ => None,
        };
        if let Some(invalid) = invalid {
            state.insert(grant_ref, invalid);
        }
    }

    pub fn is_invalid(&self, grant_ref: u16) -> bool {
        matches!(self.state.lock().get(&grant_ref), Some(RefState::Invalid { .. }))
    }

    pub fn state_of(&self, grant_ref: u16) -> Option<RefState> {
        self.state.lock().get(&grant_ref).copied()
    }
}
