//! Network frontend TX path (spec §4.6).

use std::sync::Arc;

use xsplit_grant::{GrantClient, GrantHypercalls, Pool};
use xsplit_ring::{BackRing, FrontRing, NullNotify, RingNotify};

use crate::error::{NetFrontError, Result};
use crate::wire::{crosses_page_boundary, pack_grant_addr, TxRequest, TxResponse};

struct TxShadow {
    grant_ref: u16,
    size: u16,
}

/// One guest packet buffer handed to `transmit`.
#[derive(Debug, Clone, Copy)]
pub struct TxBuffer {
    pub frame: u64,
    pub offset: u16,
    pub size: u16,
    pub csum_blank: bool,
}

pub struct TxFrontend<H: GrantHypercalls> {
    ring: FrontRing<TxRequest, TxResponse>,
    grants: Arc<GrantClient<H>>,
    pool: Pool,
    remote_domid: u32,
    connected: bool,
    free_ids: Vec<u16>,
    shadow: Vec<Option<TxShadow>>,
    batch_dirty: bool,
    batch_had_outstanding: bool,
}

impl<H: GrantHypercalls> TxFrontend<H> {
    pub fn new(
        ring_capacity: usize,
        interface_id: u32,
        remote_domid: u32,
        grants: Arc<GrantClient<H>>,
    ) -> Result<(Self, BackRing<TxRequest, TxResponse>)> {
        let (front, back) = xsplit_ring::new_ring(ring_capacity, interface_id)?;
        let pool = grants.alloc_pool(ring_capacity)?;
        let free_ids: Vec<u16> = (0..ring_capacity as u16).rev().collect();
        let shadow = (0..ring_capacity).map(|_| None).collect();
        Ok((
            Self {
                ring: front,
                grants,
                pool,
                remote_domid,
                connected: false,
                free_ids,
                shadow,
                batch_dirty: false,
                batch_had_outstanding: false,
            },
            back,
        ))
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn outstanding(&self) -> u64 {
        self.ring.outstanding()
    }

    /// Reject, copy-align, or submit one guest packet buffer (spec §4.6
    /// TX path steps 1-3). Oversized or cross-page buffers are the
    /// caller's responsibility to pre-copy - this only enqueues.
    pub fn transmit(&mut self, buf: TxBuffer) -> Result<u16> {
        if !self.connected || self.ring.is_full() {
            return Err(NetFrontError::Dropped("not connected or ring full"));
        }
        if (buf.size as usize) < crate::wire::ETH_HLEN || buf.size as usize > crate::wire::ETH_FRAME_LEN {
            return Err(NetFrontError::Dropped("size out of range"));
        }
        if crosses_page_boundary(buf.offset as u64, buf.size as u64) {
            return Err(NetFrontError::Dropped("payload crosses page boundary"));
        }

        if !self.batch_dirty {
            self.batch_had_outstanding = self.ring.outstanding() > 0;
            self.batch_dirty = true;
        }

        let shadow_id = self.free_ids.pop().ok_or(NetFrontError::Dropped("no shadow ids free"))?;
        let grant_ref = match self.pool.claim() {
            Ok(r) => r,
            Err(e) => {
                self.free_ids.push(shadow_id);
                return Err(e.into());
            }
        };
        self.grants.grant_foreign_access(grant_ref, self.remote_domid, buf.frame, false);

        let request = TxRequest {
            id: shadow_id,
            addr: pack_grant_addr(grant_ref, buf.offset),
            size: buf.size,
            csum_blank: buf.csum_blank as u8,
        };
        if let Err(e) = self.ring.push_request(request) {
            let _ = self.grants.end_foreign_access(grant_ref, true);
            let _ = self.pool.release(grant_ref);
            self.free_ids.push(shadow_id);
            return Err(e.into());
        }
        self.shadow[shadow_id as usize] = Some(TxShadow { grant_ref, size: buf.size });
        Ok(shadow_id)
    }

    /// Publish queued requests. Notification is aggressive: notify iff
    /// there were no outstanding unreceived responses at the start of
    /// this batch, minimising doorbells on a pipelined backend (spec
    /// §4.6 "Notification policy").
    pub fn flush<N: RingNotify>(&mut self, notifier: &N) {
        if !self.batch_dirty {
            return;
        }
        self.ring.publish_requests(&NullNotify);
        if !self.batch_had_outstanding {
            notifier.notify();
        }
        self.batch_dirty = false;
    }

    /// Release grants and free shadow ids for completed sends (spec
    /// §4.6 "Completion"). Returns the number of bytes freed, useful for
    /// upstream queue-wake decisions.
    pub fn complete(&mut self) -> Result<u64> {
        let mut responses = Vec::new();
        self.ring.drain_responses(&mut responses)?;
        let mut freed_bytes = 0u64;
        for rsp in responses {
            let Some(slot) = self.shadow.get_mut(rsp.id as usize) else {
                continue;
            };
            if let Some(shadow) = slot.take() {
                let _ = self.grants.end_foreign_access(shadow.grant_ref, true);
                let _ = self.pool.release(shadow.grant_ref);
                self.free_ids.push(rsp.id);
                freed_bytes += shadow.size as u64;
            }
        }
        Ok(freed_bytes)
    }
}
