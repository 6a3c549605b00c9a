//! Shared-memory request/response ring transport.
//!
//! - `RingPage<Req, Rsp>` - the shared indices + slot array (spec §3).
//! - `FrontRing<Req, Rsp>` - the requester's private view (spec §4.1).
//! - `BackRing<Req, Rsp>` - the responder's private view (spec §4.1).
//!
//! Two endpoints of a `RingPage` never touch each other's private
//! indices; all coordination goes through the shared `req_prod`/`rsp_prod`
//! and `req_event`/`rsp_event` fields.

pub mod back;
pub mod error;
pub mod notify;
pub mod page;
pub mod slot;

pub mod front;

pub use back::BackRing;
pub use error::{Result, RingError};
pub use front::FrontRing;
pub use notify::{next_event_threshold, NullNotify, RingNotify};
pub use page::RingPage;
pub use slot::Slot;

use std::sync::Arc;

/// Allocate a fresh ring page and a connected front/back pair over it.
/// Convenience for tests and for frontends standing up a brand-new ring
/// on the Closed→Disconnected transition (spec §4.4).
pub fn new_ring<Req: Copy + Default, Rsp: Copy + Default>(
    capacity: usize,
    interface_id: u32,
) -> Result<(FrontRing<Req, Rsp>, BackRing<Req, Rsp>)> {
    let page = Arc::new(RingPage::new(capacity)?);
    Ok((FrontRing::new(page.clone(), interface_id), BackRing::new(page, interface_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ring_round_trips() {
        let (mut front, mut back) = new_ring::<u32, u32>(16, 1).unwrap();
        front.push_request(5).unwrap();
        front.publish_requests(&NullNotify);
        let req = back.pop_request().unwrap().unwrap();
        back.push_response(req + 1).unwrap();
        back.publish_responses(&NullNotify);
        assert_eq!(front.pop_response().unwrap(), Some(6));
    }
}
