//! Frontend side of a ring: produces requests, consumes responses.

use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

use crate::error::{Result, RingError};
use crate::notify::{next_event_threshold, RingNotify};
use crate::page::RingPage;

/// A frontend's view of one shared ring.
///
/// `req_prod_pvt` and `rsp_cons` are private to this struct - the backend
/// never reads them directly, only the published `req_prod`/`rsp_event`
/// fields in the shared page (spec §3 "Private indices").
pub struct FrontRing<Req: Copy + Default, Rsp: Copy + Default> {
    page: Arc<RingPage<Req, Rsp>>,
    req_prod_pvt: u64,
    rsp_cons: u64,
    interface_id: u32,
}

impl<Req: Copy + Default, Rsp: Copy + Default> FrontRing<Req, Rsp> {
    pub fn new(page: Arc<RingPage<Req, Rsp>>, interface_id: u32) -> Self {
        Self { page, req_prod_pvt: 0, rsp_cons: 0, interface_id }
    }

    pub fn capacity(&self) -> u64 {
        self.page.capacity()
    }

    pub fn page(&self) -> &Arc<RingPage<Req, Rsp>> {
        &self.page
    }

    /// Number of request slots outstanding (produced but not yet acked
    /// by a consumed response).
    pub fn outstanding(&self) -> u64 {
        self.req_prod_pvt - self.rsp_cons
    }

    pub fn is_full(&self) -> bool {
        self.outstanding() == self.capacity()
    }

    /// Write `req` into the next request slot (spec §4.1 `push_request`).
    /// Does not make it visible to the backend - call `publish_requests`
    /// for that.
    pub fn push_request(&mut self, req: Req) -> Result<()> {
        if self.is_full() {
            return Err(RingError::Full);
        }
        // SAFETY: req_prod_pvt is not yet published, so we are the sole
        // writer of this slot.
        unsafe { self.page.write_req(self.req_prod_pvt, req) };
        self.req_prod_pvt += 1;
        Ok(())
    }

    /// Overwrite the most recently pushed, not-yet-published request in
    /// place (spec §4.5 scatter-gather coalescing: a new buffer that
    /// extends the previous one is folded into its request instead of
    /// starting a new one). Fails if nothing has been pushed since the
    /// last publish.
    pub fn amend_last_request(&mut self, req: Req) -> Result<()> {
        if self.req_prod_pvt == 0 {
            return Err(RingError::config("no pushed request to amend"));
        }
        let published = self.page.load_req_prod(Ordering::Relaxed);
        if self.req_prod_pvt - 1 < published {
            return Err(RingError::config("last pushed request was already published"));
        }
        // SAFETY: req_prod_pvt - 1 is >= published, so the backend has
        // not read it yet and we remain the sole writer of this slot.
        unsafe { self.page.write_req(self.req_prod_pvt - 1, req) };
        Ok(())
    }

    /// Publish all requests written since the last publish, and notify
    /// the backend iff the notification threshold was crossed (spec
    /// §4.1 `publish_requests`).
    pub fn publish_requests<N: RingNotify>(&mut self, notifier: &N) {
        let old = self.page.load_req_prod(Ordering::Relaxed);
        if old == self.req_prod_pvt {
            return;
        }
        fence(Ordering::Release);
        self.page.store_req_prod(self.req_prod_pvt, Ordering::Release);
        // Full fence: guarantees the index write is visible before we
        // read req_event, on architectures without store-store ordering.
        fence(Ordering::SeqCst);

        let req_event = self.page.load_req_event(Ordering::Acquire);
        if req_event > old && req_event <= self.req_prod_pvt {
            notifier.notify();
        }
    }

    pub fn has_unconsumed_responses(&self) -> bool {
        self.rsp_cons != self.page.load_rsp_prod(Ordering::Acquire)
    }

    /// Consume the next response, if any (spec §4.1 `pop_response`).
    /// Returns `Err(RingError::Corrupt)` - fatal for the interface - if
    /// the backend has produced more responses than the ring can hold.
    pub fn pop_response(&mut self) -> Result<Option<Rsp>> {
        let rsp_prod = self.page.load_rsp_prod(Ordering::Acquire);
        let delta = rsp_prod.wrapping_sub(self.rsp_cons);
        if delta > self.capacity() {
            return Err(RingError::Corrupt {
                interface: self.interface_id,
                delta,
                capacity: self.capacity(),
            });
        }
        if self.rsp_cons == rsp_prod {
            return Ok(None);
        }
        // SAFETY: rsp_cons < rsp_prod, so this slot has been published.
        let rsp = unsafe { self.page.read_rsp(self.rsp_cons) };
        self.rsp_cons += 1;
        Ok(Some(rsp))
    }

    /// Drain all currently-available responses into `out`.
    pub fn drain_responses(&mut self, out: &mut Vec<Rsp>) -> Result<usize> {
        let start = out.len();
        while let Some(rsp) = self.pop_response()? {
            out.push(rsp);
        }
        Ok(out.len() - start)
    }

    /// After draining, set the notification threshold for the backend's
    /// next response batch and re-check for a race (spec §4.1: "the peer
    /// must re-read the shared producer after setting its event to close
    /// the race where the producer advanced between the read and the
    /// store"). Returns `true` if more responses are already available.
    pub fn final_check_for_responses(&mut self) -> bool {
        if self.has_unconsumed_responses() {
            return true;
        }
        let producer = self.page.load_rsp_prod(Ordering::Relaxed);
        let new_event = next_event_threshold(self.rsp_cons, producer);
        self.page.store_rsp_event(new_event, Ordering::Release);
        fence(Ordering::SeqCst);
        self.has_unconsumed_responses()
    }
}
