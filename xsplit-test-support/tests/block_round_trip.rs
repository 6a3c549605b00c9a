//! Scenario S1 (spec §8) exercised as a true cross-crate test: a real
//! `xsplit-blkfront` frontend against a hand-rolled backend responder
//! driven directly through `xsplit-ring::BackRing`. There is no
//! dedicated backend crate in scope, so the responder here plays the
//! minimal role spec.md assigns the host side: pop a request, decide a
//! status, push a response.

use std::sync::Arc;

use xsplit_blkfront::{BlockFrontend, BlockOp, BlockResponse, RequestSegment, STATUS_ERR, STATUS_OK};
use xsplit_grant::hypervisor::sim::SimHypervisor;
use xsplit_grant::GrantClient;
use xsplit_ring::NullNotify;

fn grants() -> Arc<GrantClient<SimHypervisor>> {
    Arc::new(GrantClient::new(Arc::new(SimHypervisor::new())))
}

#[test]
fn write_round_trips_and_releases_shadow_and_grant() {
    let grants = grants();
    let (mut front, mut back) = BlockFrontend::new(32, 7, 0, grants.clone()).unwrap();

    let segs = [RequestSegment { frame: 0x2000, first_sector: 0, last_sector: 7 }];
    let shadow_id = front.enqueue(100, BlockOp::Write, 1, 100, &segs).unwrap();
    front.flush(&NullNotify);
    assert!(front.shadow_is_occupied(shadow_id));

    let req = back.pop_request().unwrap().unwrap();
    assert_eq!(req.id, shadow_id);
    assert_eq!(req.op, BlockOp::Write.to_wire());
    back.push_response(BlockResponse { id: req.id, op: req.op, status: STATUS_OK }).unwrap();
    back.publish_responses(&NullNotify);

    let completions = front.poll_completions().unwrap();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].client_id, 100);
    assert!(completions[0].ok);

    assert!(!front.shadow_is_occupied(shadow_id));
}

#[test]
fn backend_error_status_surfaces_as_a_failed_completion() {
    let grants = grants();
    let (mut front, mut back) = BlockFrontend::new(32, 7, 0, grants).unwrap();

    let segs = [RequestSegment { frame: 0x3000, first_sector: 0, last_sector: 7 }];
    let shadow_id = front.enqueue(101, BlockOp::Read, 1, 200, &segs).unwrap();
    front.flush(&NullNotify);

    let req = back.pop_request().unwrap().unwrap();
    back.push_response(BlockResponse { id: req.id, op: req.op, status: STATUS_ERR }).unwrap();
    back.publish_responses(&NullNotify);

    let completions = front.poll_completions().unwrap();
    assert_eq!(completions.len(), 1);
    assert!(!completions[0].ok);
    assert!(!front.shadow_is_occupied(shadow_id));
}
