//! The control-message path: a `Probe` op on the same ring, blocking
//! the caller on a condition variable keyed by `control_rsp_valid`
//! (spec §4.5 "Control messages").

use parking_lot::{Condvar, Mutex};

use crate::error::{BlkError, Result};
use crate::wire::BlockResponse;

/// Serialises concurrent control calls and hands the caller back the
/// matching response once the completion path delivers it.
#[derive(Default)]
pub struct ControlGate {
    call_lock: Mutex<()>,
    pending: Mutex<Option<BlockResponse>>,
    valid: Condvar,
}

impl ControlGate {
    pub fn new() -> Self {
        Self { call_lock: Mutex::new(()), pending: Mutex::new(None), valid: Condvar::new() }
    }

    /// Reserve the gate for one in-flight control call. Only one may be
    /// outstanding at a time; a second concurrent caller gets
    /// `ProbeInProgress` rather than blocking, since the ring must fully
    /// drain before a second control op is issued.
    pub fn begin(&self) -> Result<ControlCallGuard<'_>> {
        let guard = self.call_lock.try_lock().ok_or(BlkError::ProbeInProgress)?;
        Ok(ControlCallGuard { _guard: guard, gate: self })
    }

    /// Called from the completion path when the matching response
    /// arrives; wakes the blocked caller.
    pub fn complete(&self, response: BlockResponse) {
        *self.pending.lock() = Some(response);
        self.valid.notify_one();
    }

    fn wait(&self) -> BlockResponse {
        let mut pending = self.pending.lock();
        loop {
            if let Some(rsp) = pending.take() {
                return rsp;
            }
            self.valid.wait(&mut pending);
        }
    }
}

/// Held for the duration of one control call; dropping it releases the
/// gate for the next caller.
pub struct ControlCallGuard<'a> {
    _guard: parking_lot::MutexGuard<'a, ()>,
    gate: &'a ControlGate,
}

impl ControlCallGuard<'_> {
    pub fn wait(&self) -> BlockResponse {
        self.gate.wait()
    }
}
