//! Block frontend: shadow ring, request pickling, and suspend/resume
//! recovery over the shared ring transport (spec §4.5).

pub mod error;
pub mod frontend;
pub mod probe;
pub mod shadow;
pub mod wire;

pub use error::{BlkError, Result};
pub use frontend::{BlockFrontend, Completion, RequestSegment};
pub use shadow::{PickledRequest, PickledSegment, ShadowRing};
pub use wire::{BlockOp, BlockRequest, BlockResponse, Segment, MAX_SEGMENTS, STATUS_ERR, STATUS_OK};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use xsplit_grant::hypervisor::sim::SimHypervisor;
    use xsplit_grant::GrantClient;
    use xsplit_ring::NullNotify;

    use crate::frontend::{BlockFrontend, RequestSegment};
    use crate::wire::BlockOp;

    fn hv_client() -> Arc<GrantClient<SimHypervisor>> {
        Arc::new(GrantClient::new(Arc::new(SimHypervisor::new())))
    }

    /// Scenario S1: a Write round-trips through frontend+backend rings
    /// with the shadow slot and grant reference both released.
    #[test]
    fn s1_block_round_trip() {
        let grants = hv_client();
        let (mut front, mut back) = BlockFrontend::new(32, 7, 0, grants).unwrap();

        let segs = [RequestSegment { frame: 0x1000, first_sector: 0, last_sector: 7 }];
        let shadow_id = front.enqueue(100, BlockOp::Write, 1, 100, &segs).unwrap();
        front.flush(&NullNotify);

        let req = back.pop_request().unwrap().unwrap();
        assert_eq!(req.id, shadow_id);
        back.push_response(crate::wire::BlockResponse {
            id: req.id,
            op: req.op,
            status: crate::wire::STATUS_OK,
        })
        .unwrap();
        back.publish_responses(&NullNotify);

        let completions = front.poll_completions().unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].client_id, 100);
        assert!(completions[0].ok);
        assert!(!front.shadow_is_occupied(shadow_id));
    }

    #[test]
    fn contiguous_sectors_coalesce_into_one_request() {
        let grants = hv_client();
        let (mut front, mut back) = BlockFrontend::new(32, 7, 0, grants).unwrap();

        let first = front
            .submit_segment(1, BlockOp::Write, 1, 100, RequestSegment { frame: 0x1000, first_sector: 0, last_sector: 0 })
            .unwrap();
        let second = front
            .submit_segment(1, BlockOp::Write, 1, 101, RequestSegment { frame: 0x2000, first_sector: 0, last_sector: 0 })
            .unwrap();
        assert_eq!(first, second, "a contiguous sector folds into the same request");
        front.flush(&NullNotify);

        let req = back.pop_request().unwrap().unwrap();
        assert_eq!(req.id, first);
        assert_eq!(req.nr_segments, 2);
        assert_eq!(back.pop_request().unwrap(), None, "only one request was ever pushed");
    }

    #[test]
    fn non_contiguous_sector_starts_a_new_request() {
        let grants = hv_client();
        let (mut front, mut back) = BlockFrontend::new(32, 7, 0, grants).unwrap();

        let first = front
            .submit_segment(1, BlockOp::Write, 1, 100, RequestSegment { frame: 0x1000, first_sector: 0, last_sector: 0 })
            .unwrap();
        let second = front
            .submit_segment(1, BlockOp::Write, 1, 500, RequestSegment { frame: 0x2000, first_sector: 0, last_sector: 0 })
            .unwrap();
        assert_ne!(first, second);
        front.flush(&NullNotify);

        let mut requests = Vec::new();
        back.drain_requests(&mut requests).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].nr_segments, 1);
        assert_eq!(requests[1].nr_segments, 1);
    }

    #[test]
    fn coalescing_stops_once_a_request_fills_to_max_segments() {
        let grants = hv_client();
        let (mut front, mut back) = BlockFrontend::new(32, 7, 0, grants).unwrap();

        let mut ids = Vec::new();
        for i in 0..(crate::wire::MAX_SEGMENTS as u64 + 1) {
            let id = front
                .submit_segment(
                    1,
                    BlockOp::Write,
                    1,
                    100 + i,
                    RequestSegment { frame: 0x1000 + i, first_sector: 0, last_sector: 0 },
                )
                .unwrap();
            ids.push(id);
        }
        // The first MAX_SEGMENTS submissions all coalesce into the
        // first shadow id; the one past the cap starts a new request.
        assert!(ids[..crate::wire::MAX_SEGMENTS].iter().all(|id| *id == ids[0]));
        assert_ne!(ids[crate::wire::MAX_SEGMENTS], ids[0]);

        front.flush(&NullNotify);
        let mut requests = Vec::new();
        back.drain_requests(&mut requests).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].nr_segments as usize, crate::wire::MAX_SEGMENTS);
        assert_eq!(requests[1].nr_segments, 1);
    }
}
