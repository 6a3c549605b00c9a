//! Network frontend RX path: buffer donation via page flip, and
//! exponential-increase/linear-decrease fill-target shaping (spec §4.6
//! "RX refill", "RX delivery").

use std::collections::HashMap;
use std::sync::Arc;

use xsplit_grant::{GrantClient, GrantHypercalls, Pool};
use xsplit_ring::{FrontRing, RingNotify};

use crate::error::Result;
use crate::hypervisor::NetFrontHypercalls;
use crate::wire::{RxRequest, RxResponse};

/// Exponential-increase / linear-decrease fill target, bounded
/// `[min, max]` (spec §4.6: "halved when the backend consumed
/// substantially fewer than requested, and doubled when the frontend
/// nearly ran out").
pub struct FillTarget {
    target: u32,
    min: u32,
    max: u32,
}

impl FillTarget {
    pub fn new(initial: u32, min: u32, max: u32) -> Self {
        Self { target: initial.clamp(min, max), min, max }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Adjust after one refill/drain cycle: `posted` buffers were
    /// outstanding before this batch, `consumed` were taken by the
    /// backend, `remaining` are still posted afterward.
    pub fn adjust(&mut self, posted: u32, consumed: u32, remaining: u32) {
        if posted > 0 && consumed * 2 < posted {
            self.target = (self.target / 2).max(self.min);
        } else if remaining * 4 < self.target {
            self.target = (self.target * 2).min(self.max);
        }
    }
}

/// A packet delivered up to the guest network stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxPacket {
    pub machine_frame: u64,
    pub offset: u16,
    pub size: u16,
    pub csum_valid: bool,
}

struct Posted {
    page: u64,
}

pub struct RxFrontend<H: GrantHypercalls> {
    ring: FrontRing<RxRequest, RxResponse>,
    grants: Arc<GrantClient<H>>,
    pool: Pool,
    remote_domid: u32,
    fill: FillTarget,
    posted: HashMap<u16, Posted>,
    /// How many "buffer too small" drops occurred - a rate-limited
    /// warning is logged only on the first of each contiguous run.
    discard_streak: u32,
}

impl<H: GrantHypercalls> RxFrontend<H> {
    pub fn new(
        ring_capacity: usize,
        interface_id: u32,
        remote_domid: u32,
        grants: Arc<GrantClient<H>>,
        fill_min: u32,
        fill_max: u32,
    ) -> Result<Self> {
        let (front, _back) = xsplit_ring::new_ring(ring_capacity, interface_id)?;
        let pool = grants.alloc_pool(ring_capacity)?;
        Ok(Self {
            ring: front,
            grants,
            pool,
            remote_domid,
            fill: FillTarget::new(fill_min, fill_min, fill_max),
            posted: HashMap::new(),
            discard_streak: 0,
        })
    }

    pub fn target(&self) -> u32 {
        self.fill.target()
    }

    pub fn posted_count(&self) -> usize {
        self.posted.len()
    }

    /// Post buffers up to the fill target (spec §4.6 "RX refill").
    pub fn refill<N: RingNotify>(&mut self, hv: &dyn NetFrontHypercalls, notifier: &N) -> Result<()> {
        let mut zapped = Vec::new();
        while (self.posted.len() as u32) < self.fill.target() && !self.ring.is_full() {
            let page = hv.alloc_page();
            let grant_ref = match self.pool.claim() {
                Ok(r) => r,
                Err(_) => break,
            };
            self.grants.grant_foreign_transfer(grant_ref, self.remote_domid, page);
            self.ring.push_request(RxRequest { id: grant_ref, gref: grant_ref })?;
            self.posted.insert(grant_ref, Posted { page });
            zapped.push(page);
        }
        if !zapped.is_empty() {
            hv.batch_zap_and_decrease_reservation(&zapped);
            self.ring.publish_requests(notifier);
        }
        Ok(())
    }

    /// Deliver received packets, running the page-flip dance for each
    /// response (spec §4.6 "RX delivery"). `mtu` bounds the size beyond
    /// which the packet is recopied into a fresh buffer with 16 bytes
    /// of head room; here that's represented by `copied = true` in the
    /// result rather than performed physically, since buffer allocation
    /// is the caller's concern.
    pub fn deliver(&mut self, hv: &dyn NetFrontHypercalls, mtu: u16) -> Result<Vec<RxPacket>> {
        let posted_before = self.posted.len() as u32;
        let mut responses = Vec::new();
        self.ring.drain_responses(&mut responses)?;

        let mut packets = Vec::with_capacity(responses.len());
        for rsp in &responses {
            let Some(Posted { page }) = self.posted.remove(&rsp.id) else { continue };
            if !rsp.is_ok() {
                let _ = self.grants.end_foreign_transfer(rsp.id);
                let _ = self.pool.release(rsp.id);
                continue;
            }
            let new_frame = match self.grants.end_foreign_transfer(rsp.id) {
                Ok(f) => f,
                Err(_) => {
                    let _ = self.pool.release(rsp.id);
                    continue;
                }
            };
            let _ = self.pool.release(rsp.id);

            hv.update_p2m(page, new_frame);
            hv.install_pte(page, new_frame);

            let size = rsp.status as u16;
            if size > mtu {
                // Oversized: caller must recopy into a fresh buffer with
                // 16-byte head room before passing upward. We still
                // report the frame/size; `size > mtu` is the signal.
                if size as usize > crate::wire::PAGE_SIZE as usize {
                    self.discard_streak += 1;
                    if self.discard_streak == 1 || self.discard_streak % 100 == 0 {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(size, "RX buffer too small, discarding packet");
                    }
                    continue;
                }
            }
            self.discard_streak = 0;
            packets.push(RxPacket {
                machine_frame: new_frame,
                offset: rsp.addr,
                size,
                csum_valid: rsp.csum_valid != 0,
            });
        }

        let consumed = responses.len() as u32;
        let remaining = self.posted.len() as u32;
        self.fill.adjust(posted_before, consumed, remaining);
        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::sim::SimNetHypervisor;
    use xsplit_grant::hypervisor::sim::SimHypervisor;
    use xsplit_ring::{BackRing, NullNotify};

    /// Scenario S5: zero-copy RX page flip.
    #[test]
    fn s5_zero_copy_rx_page_flip() {
        let sim_hv = Arc::new(SimHypervisor::new());
        let grants = Arc::new(GrantClient::new(sim_hv.clone()));
        let mut rx = RxFrontend::new(16, 1, 0, grants, 8, 16).unwrap();
        let hv = SimNetHypervisor::new();

        rx.refill(&hv, &NullNotify).unwrap();
        assert_eq!(rx.posted_count(), 8);

        // Stand up a matching backend view over the same page to
        // simulate 3 arriving packets.
        let page = rx.ring.page().clone();
        let mut back: BackRing<RxRequest, RxResponse> = BackRing::new(page, 1);
        let mut reqs = Vec::new();
        back.drain_requests(&mut reqs).unwrap();
        assert_eq!(reqs.len(), 8);

        for req in reqs.iter().take(3) {
            back.push_response(RxResponse { id: req.id, addr: 0, status: 100, csum_valid: 1 }).unwrap();
            // The backend takes ownership of the transferred page and
            // hands back a (possibly different) machine frame.
            sim_hv.remote_consume_transfer(req.id, req.gref as u64 + 0x1000);
        }
        back.publish_responses(&NullNotify);

        let packets = rx.deliver(&hv, 1500).unwrap();
        assert_eq!(packets.len(), 3);
        for packet in &packets {
            assert!(packet.size <= 1500);
            assert!(packet.csum_valid);
        }
        assert_eq!(rx.posted_count(), 5);
    }
}
