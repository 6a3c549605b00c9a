//! A backend's per-interface record (spec §3 "Interface record").

use std::time::Instant;

use crate::credit::CreditShaper;

pub struct InterfaceRecord {
    pub id: u32,
    pub domid: u32,
    pub credit: CreditShaper,
    /// Whether this interface currently has a slot on the schedule
    /// list - guards against linking it twice in one drain cycle
    /// (spec §5 "linked/unlinked at most once per drain cycle").
    pub scheduled: bool,
    pub refcnt: u32,
}

impl InterfaceRecord {
    pub fn new(id: u32, domid: u32, credit_bytes: u64, credit_usec: u64, now: Instant) -> Self {
        Self {
            id,
            domid,
            credit: CreditShaper::new(credit_bytes, credit_usec, now),
            scheduled: false,
            refcnt: 0,
        }
    }
}
