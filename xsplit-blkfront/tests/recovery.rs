//! Scenario S3: suspend/resume with outstanding requests (spec §8).

use std::sync::Arc;

use xsplit_blkfront::{BlockFrontend, BlockOp, RequestSegment};
use xsplit_grant::hypervisor::sim::SimHypervisor;
use xsplit_grant::GrantClient;
use xsplit_ring::{new_ring, NullNotify};

#[test]
fn three_outstanding_requests_survive_a_reset() {
    let grants = Arc::new(GrantClient::new(Arc::new(SimHypervisor::new())));
    let (mut front, _back) = BlockFrontend::new(16, 1, 0, grants).unwrap();

    let mut shadow_ids = Vec::new();
    for i in 0..3u64 {
        let segs = [RequestSegment { frame: 0x2000 + i, first_sector: 0, last_sector: 7 }];
        let id = front.enqueue(100 + i, BlockOp::Write, 0, 10 * i, &segs).unwrap();
        shadow_ids.push(id);
    }
    front.flush(&NullNotify);
    for id in &shadow_ids {
        assert!(front.shadow_is_occupied(*id));
    }

    // Simulate the peer going away and a fresh ring being negotiated.
    front.begin_recovery();
    let (new_front_ring, mut new_back) = new_ring(16, 1).unwrap();
    front.recover(new_front_ring, &NullNotify).unwrap();
    assert!(!front.is_recovering());

    // All three requests reappear on the new ring with the guest's
    // original ids preserved in the shadow, under possibly-different
    // ring ids.
    let mut reqs = Vec::new();
    new_back.drain_requests(&mut reqs).unwrap();
    assert_eq!(reqs.len(), 3);

    for req in reqs {
        new_back
            .push_response(xsplit_blkfront::BlockResponse {
                id: req.id,
                op: req.op,
                status: xsplit_blkfront::STATUS_OK,
            })
            .unwrap();
    }
    new_back.publish_responses(&NullNotify);

    let completions = front.poll_completions().unwrap();
    assert_eq!(completions.len(), 3);
    let mut client_ids: Vec<u64> = completions.iter().map(|c| c.client_id).collect();
    client_ids.sort();
    assert_eq!(client_ids, vec![100, 101, 102]);
    for c in completions {
        assert!(c.ok);
    }
}
