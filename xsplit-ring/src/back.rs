//! Backend side of a ring: consumes requests, produces responses.

use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

use crate::error::{Result, RingError};
use crate::notify::{next_event_threshold, RingNotify};
use crate::page::RingPage;

/// A backend's view of one shared ring. Symmetric to `FrontRing`.
pub struct BackRing<Req: Copy + Default, Rsp: Copy + Default> {
    page: Arc<RingPage<Req, Rsp>>,
    req_cons: u64,
    rsp_prod_pvt: u64,
    interface_id: u32,
}

impl<Req: Copy + Default, Rsp: Copy + Default> BackRing<Req, Rsp> {
    pub fn new(page: Arc<RingPage<Req, Rsp>>, interface_id: u32) -> Self {
        Self { page, req_cons: 0, rsp_prod_pvt: 0, interface_id }
    }

    pub fn capacity(&self) -> u64 {
        self.page.capacity()
    }

    pub fn page(&self) -> &Arc<RingPage<Req, Rsp>> {
        &self.page
    }

    pub fn has_unconsumed_requests(&self) -> bool {
        self.req_cons != self.page.load_req_prod(Ordering::Acquire)
    }

    /// Consume the next request, if any (spec §4.1 `pop_request`).
    /// Fatal `RingError::Corrupt` if the frontend has outrun the ring's
    /// capacity.
    pub fn pop_request(&mut self) -> Result<Option<Req>> {
        let req_prod = self.page.load_req_prod(Ordering::Acquire);
        let delta = req_prod.wrapping_sub(self.req_cons);
        if delta > self.capacity() {
            return Err(RingError::Corrupt {
                interface: self.interface_id,
                delta,
                capacity: self.capacity(),
            });
        }
        if self.req_cons == req_prod {
            return Ok(None);
        }
        // SAFETY: req_cons < req_prod, so this slot has been published.
        let req = unsafe { self.page.read_req(self.req_cons) };
        self.req_cons += 1;
        Ok(Some(req))
    }

    pub fn drain_requests(&mut self, out: &mut Vec<Req>) -> Result<usize> {
        let start = out.len();
        while let Some(req) = self.pop_request()? {
            out.push(req);
        }
        Ok(out.len() - start)
    }

    /// Write `rsp` for the next not-yet-responded slot (spec §4.1
    /// `push_response`). The slot overwrites the request that used to
    /// live there - see `crate::slot::Slot`.
    pub fn push_response(&mut self, rsp: Rsp) -> Result<()> {
        debug_assert!(
            self.rsp_prod_pvt < self.req_cons,
            "responding to a request that has not been consumed yet"
        );
        if self.rsp_prod_pvt >= self.req_cons {
            return Err(RingError::config("response produced for unconsumed request"));
        }
        // SAFETY: this slot was consumed as a request at req_cons > rsp_prod_pvt,
        // and only the responder writes rsp_prod_pvt-indexed slots.
        unsafe { self.page.write_rsp(self.rsp_prod_pvt, rsp) };
        self.rsp_prod_pvt += 1;
        Ok(())
    }

    /// Publish produced responses, notifying the frontend iff its
    /// threshold was crossed.
    pub fn publish_responses<N: RingNotify>(&mut self, notifier: &N) {
        let old = self.page.load_rsp_prod(Ordering::Relaxed);
        if old == self.rsp_prod_pvt {
            return;
        }
        fence(Ordering::Release);
        self.page.store_rsp_prod(self.rsp_prod_pvt, Ordering::Release);
        fence(Ordering::SeqCst);

        let rsp_event = self.page.load_rsp_event(Ordering::Acquire);
        if rsp_event > old && rsp_event <= self.rsp_prod_pvt {
            notifier.notify();
        }
    }

    /// After draining, set the request-notification threshold and
    /// re-check for a race, mirroring `FrontRing::final_check_for_responses`.
    pub fn final_check_for_requests(&mut self) -> bool {
        if self.has_unconsumed_requests() {
            return true;
        }
        let producer = self.page.load_req_prod(Ordering::Relaxed);
        let new_event = next_event_threshold(self.req_cons, producer);
        self.page.store_req_event(new_event, Ordering::Release);
        fence(Ordering::SeqCst);
        self.has_unconsumed_requests()
    }
}
