//! The block frontend: queue discipline, completion, and suspend/resume
//! recovery over a shared ring plus a private shadow ring (spec §4.5).

use std::sync::Arc;

use xsplit_grant::{GrantClient, GrantHypercalls, Pool};
use xsplit_ring::{new_ring, BackRing, FrontRing, RingNotify};

use crate::error::{BlkError, Result};
use crate::probe::ControlGate;
use crate::shadow::{PickledRequest, PickledSegment, ShadowRing};
use crate::wire::{BlockOp, BlockRequest, BlockResponse, Segment, MAX_SEGMENTS};

/// One buffer segment as the caller hands it in: the machine frame
/// backing the guest buffer, and the sector range it covers.
#[derive(Debug, Clone, Copy)]
pub struct RequestSegment {
    pub frame: u64,
    pub first_sector: u8,
    pub last_sector: u8,
}

/// A completed request, handed back up to the guest completion
/// callback (spec §4.5 "Completion").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub client_id: u64,
    pub op: BlockOp,
    pub ok: bool,
}

/// Scatter-gather coalescing state (spec §4.5, supplemented from
/// `blkfront.c`'s `sg_next_sect`): the most recently queued request, if
/// the next single-sector submission might still extend it.
struct SgState {
    op: BlockOp,
    device: u16,
    next_sector: u64,
    shadow_id: u64,
}

/// The block frontend driver. Generic over the grant hypercall
/// boundary so it can run against a simulated hypervisor in tests.
pub struct BlockFrontend<H: GrantHypercalls> {
    ring: FrontRing<BlockRequest, BlockResponse>,
    shadow: ShadowRing,
    grants: Arc<GrantClient<H>>,
    pool: Pool,
    remote_domid: u32,
    stopped: bool,
    recovery: bool,
    control: ControlGate,
    sg: Option<SgState>,
}

impl<H: GrantHypercalls> BlockFrontend<H> {
    /// Build a frontend over a fresh ring of `ring_capacity` slots
    /// (power of two), with a shadow ring of the same size and a grant
    /// pool sized per spec §3 lifecycle: `ring_slots * max_segments + 1`.
    pub fn new(
        ring_capacity: usize,
        interface_id: u32,
        remote_domid: u32,
        grants: Arc<GrantClient<H>>,
    ) -> Result<(Self, BackRing<BlockRequest, BlockResponse>)> {
        let (front, back) = new_ring(ring_capacity, interface_id)?;
        let shadow = ShadowRing::new(ring_capacity);
        let pool = grants.alloc_pool(ring_capacity * MAX_SEGMENTS + 1)?;
        Ok((
            Self {
                ring: front,
                shadow,
                grants,
                pool,
                remote_domid,
                stopped: false,
                recovery: false,
                control: ControlGate::new(),
                sg: None,
            },
            back,
        ))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_recovering(&self) -> bool {
        self.recovery
    }

    /// Queue one guest request (spec §4.5 queue discipline, steps 1-3).
    /// Does not publish or notify - call `flush` once the enqueue loop
    /// completes (step 4).
    pub fn enqueue(
        &mut self,
        client_id: u64,
        op: BlockOp,
        device: u16,
        sector: u64,
        buffers: &[RequestSegment],
    ) -> Result<u64> {
        if buffers.is_empty() || buffers.len() > MAX_SEGMENTS {
            return Err(BlkError::InvalidRequest("segment count out of range"));
        }
        if self.stopped || self.ring.is_full() {
            self.stopped = true;
            return Err(BlkError::RingFull);
        }

        let shadow_id = match self.shadow.alloc() {
            Ok(id) => id,
            Err(e) => {
                self.stopped = true;
                return Err(e);
            }
        };

        let mut pickled = Vec::with_capacity(buffers.len());
        let mut wire_segments = [Segment::default(); MAX_SEGMENTS];
        for (i, buf) in buffers.iter().enumerate() {
            let grant_ref = match self.pool.claim() {
                Ok(r) => r,
                Err(e) => {
                    for already in &pickled {
                        let p: &PickledSegment = already;
                        let _ = self.grants.end_foreign_access(p.grant_ref, !op.is_write());
                        let _ = self.pool.release(p.grant_ref);
                    }
                    self.shadow.release(shadow_id);
                    self.stopped = true;
                    return Err(e.into());
                }
            };
            self.grants.grant_foreign_access(grant_ref, self.remote_domid, buf.frame, op.is_write());
            wire_segments[i] = Segment {
                gref_or_frame: grant_ref as u32,
                first_sector: buf.first_sector,
                last_sector: buf.last_sector,
            };
            pickled.push(PickledSegment {
                grant_ref,
                frame: buf.frame,
                first_sector: buf.first_sector,
                last_sector: buf.last_sector,
            });
        }

        self.shadow.occupy(
            shadow_id,
            PickledRequest { client_id, op, device, sector, segments: pickled },
        );

        let request = BlockRequest {
            id: shadow_id,
            op: op.to_wire(),
            nr_segments: buffers.len() as u8,
            device,
            sector,
            segments: wire_segments,
        };
        if let Err(e) = self.ring.push_request(request) {
            self.shadow.release(shadow_id);
            self.stopped = true;
            return Err(e.into());
        }
        Ok(shadow_id)
    }

    /// Submit one contiguous run of sectors within a single page,
    /// mirroring `blkfront.c`'s buffer_head-at-a-time submission path.
    /// If this segment is the same operation and device, and directly
    /// continues the previous submission's sector range, it is folded
    /// into that request as an extra segment instead of allocating a
    /// new ring entry (spec §4.5, supplemented `sg_next_sect`
    /// coalescing). Coalescing stops once a request fills to
    /// `MAX_SEGMENTS`, same as the original's `DISABLE_SCATTERGATHER()`.
    pub fn submit_segment(
        &mut self,
        client_id: u64,
        op: BlockOp,
        device: u16,
        sector: u64,
        segment: RequestSegment,
    ) -> Result<u64> {
        let nr_sectors = (segment.last_sector - segment.first_sector + 1) as u64;

        let coalesce_target = self.sg.as_ref().and_then(|sg| {
            let room = self.shadow.get(sg.shadow_id).map(|p| p.segments.len() < MAX_SEGMENTS).unwrap_or(false);
            (sg.op == op && sg.device == device && sg.next_sector == sector && room).then_some(sg.shadow_id)
        });

        if let Some(shadow_id) = coalesce_target {
            if let Some(shadow_id) = self.try_append_segment(shadow_id, segment) {
                let full = self.shadow.get(shadow_id).map(|p| p.segments.len() >= MAX_SEGMENTS).unwrap_or(true);
                if full {
                    self.sg = None;
                } else if let Some(sg) = &mut self.sg {
                    sg.next_sector += nr_sectors;
                }
                return Ok(shadow_id);
            }
            // The outstanding request is no longer amendable - either a
            // flush published it, or it already completed - so fall
            // through to a fresh request.
            self.sg = None;
        }

        let shadow_id = self.enqueue(client_id, op, device, sector, &[segment])?;
        self.sg = Some(SgState { op, device, next_sector: sector + nr_sectors, shadow_id });
        Ok(shadow_id)
    }

    /// Append `segment` to the already-queued request at `shadow_id` by
    /// rewriting its still-unpublished ring slot. Returns `None` (and
    /// undoes the grant/pickle) if the slot turned out to already be
    /// published.
    fn try_append_segment(&mut self, shadow_id: u64, segment: RequestSegment) -> Option<u64> {
        let op = self.shadow.get(shadow_id)?.op;
        let grant_ref = self.pool.claim().ok()?;
        self.grants.grant_foreign_access(grant_ref, self.remote_domid, segment.frame, op.is_write());

        let pickled = self.shadow.get_mut(shadow_id)?;
        pickled.segments.push(PickledSegment {
            grant_ref,
            frame: segment.frame,
            first_sector: segment.first_sector,
            last_sector: segment.last_sector,
        });

        let pickled = self.shadow.get(shadow_id)?;
        let mut wire_segments = [Segment::default(); MAX_SEGMENTS];
        for (i, seg) in pickled.segments.iter().enumerate() {
            wire_segments[i] =
                Segment { gref_or_frame: seg.grant_ref as u32, first_sector: seg.first_sector, last_sector: seg.last_sector };
        }
        let request = BlockRequest {
            id: shadow_id,
            op: op.to_wire(),
            nr_segments: pickled.segments.len() as u8,
            device: pickled.device,
            sector: pickled.sector,
            segments: wire_segments,
        };

        if self.ring.amend_last_request(request).is_err() {
            let pickled = self.shadow.get_mut(shadow_id)?;
            pickled.segments.pop();
            let _ = self.grants.end_foreign_access(grant_ref, !op.is_write());
            let _ = self.pool.release(grant_ref);
            return None;
        }
        Some(shadow_id)
    }

    /// Publish all requests queued since the last flush and notify the
    /// backend per the ring's threshold policy (spec §4.5 step 4).
    pub fn flush<N: RingNotify>(&mut self, notifier: &N) {
        self.ring.publish_requests(notifier);
    }

    /// Drain available responses, releasing grants and returning shadow
    /// ids to the free list (spec §4.5 "Completion"). Control responses
    /// are routed to the blocked `probe` caller instead of the returned
    /// completion list. Clears the stop-queue flag if space was freed.
    pub fn poll_completions(&mut self) -> Result<Vec<Completion>> {
        let mut responses = Vec::new();
        self.ring.drain_responses(&mut responses)?;

        let mut completions = Vec::with_capacity(responses.len());
        for rsp in responses {
            let Some(pickled) = self.shadow.get(rsp.id) else {
                continue;
            };
            if pickled.op == BlockOp::Probe {
                self.shadow.release(rsp.id);
                self.control.complete(rsp);
                continue;
            }

            let pickled = self.shadow.release(rsp.id).expect("checked occupied above");
            for seg in &pickled.segments {
                let was_write = pickled.op.is_write();
                match self.grants.end_foreign_access(seg.grant_ref, !was_write) {
                    Ok(()) => {
                        let _ = self.pool.release(seg.grant_ref);
                    }
                    Err(_) => {
                        // Remote still mapped; leave the reference held.
                        // A future retry (e.g. on teardown) will reclaim it.
                    }
                }
            }
            completions.push(Completion { client_id: pickled.client_id, op: pickled.op, ok: rsp.is_ok() });
        }

        if self.stopped && !self.ring.is_full() {
            self.stopped = false;
        }
        Ok(completions)
    }

    /// Issue a `Probe` control request and block the caller until its
    /// response arrives (spec §4.5 "Control messages"). The ring must be
    /// driven by a concurrent `poll_completions` caller (e.g. the event
    /// channel handler) for this to make progress.
    pub fn probe<N: RingNotify>(&mut self, notifier: &N) -> Result<BlockResponse> {
        let call = self.control.begin()?;
        let shadow_id = self.shadow.alloc()?;
        self.shadow.occupy(
            shadow_id,
            PickledRequest { client_id: 0, op: BlockOp::Probe, device: 0, sector: 0, segments: vec![] },
        );
        let request = BlockRequest { id: shadow_id, op: BlockOp::Probe.to_wire(), ..Default::default() };
        self.ring.push_request(request)?;
        self.ring.publish_requests(notifier);
        Ok(call.wait())
    }

    /// Recovery procedure, run once per Disconnected→Connected
    /// transition while `recovery == true` (spec §4.5 "Recovery
    /// procedure"). `new_ring` is the frontend's freshly `FRONT_RING_INIT`-ed
    /// ring over the page the state machine just (re)allocated; this
    /// re-submits every in-flight request against it with fresh grant
    /// references where needed.
    pub fn recover<N: RingNotify>(
        &mut self,
        new_ring: FrontRing<BlockRequest, BlockResponse>,
        notifier: &N,
    ) -> Result<()> {
        let snapshot = self.shadow.snapshot_occupied();
        self.shadow.reinit_free_list();
        self.ring = new_ring;
        self.sg = None;

        for (_old_id, request) in snapshot {
            let new_id = self.shadow.alloc()?;
            let mut wire_segments = [Segment::default(); MAX_SEGMENTS];
            for (i, seg) in request.segments.iter().enumerate() {
                if self.grants.is_invalid(seg.grant_ref) {
                    self.grants.grant_foreign_access(
                        seg.grant_ref,
                        self.remote_domid,
                        seg.frame,
                        request.op.is_write(),
                    );
                }
                wire_segments[i] = Segment {
                    gref_or_frame: seg.grant_ref as u32,
                    first_sector: seg.first_sector,
                    last_sector: seg.last_sector,
                };
            }
            let wire = BlockRequest {
                id: new_id,
                op: request.op.to_wire(),
                nr_segments: request.segments.len() as u8,
                device: request.device,
                sector: request.sector,
                segments: wire_segments,
            };
            self.shadow.occupy(new_id, request);
            self.ring.push_request(wire)?;
        }

        self.recovery = false;
        self.flush(notifier);
        Ok(())
    }

    pub fn begin_recovery(&mut self) {
        self.recovery = true;
    }

    pub fn shadow_capacity(&self) -> usize {
        self.shadow.capacity()
    }

    pub fn shadow_is_occupied(&self, id: u64) -> bool {
        self.shadow.is_occupied(id)
    }
}
