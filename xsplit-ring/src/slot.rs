//! The ring slot: a tagged union of one request and one response of
//! identical wire size (spec §3 "Ring page").
//!
//! The backend overwrites a request slot in place with its response once
//! consumed; the two halves are never live at once, which is why a union
//! (rather than an enum with a discriminant) is the right shape here - it
//! matches the bit-exact wire layouts in spec §6.

/// A ring slot holding either a pending request or a produced response.
///
/// # Safety
/// Callers must only call `read_req`/`write_req` while the slot is known
/// to hold a request (i.e. before the responder has overwritten it), and
/// only call `read_rsp`/`write_rsp` once the responder has written a
/// response. The ring's producer/consumer index protocol is what
/// establishes that ordering; this type does no checking of its own.
#[repr(C)]
pub union Slot<Req: Copy, Rsp: Copy> {
    req: Req,
    rsp: Rsp,
}

impl<Req: Copy, Rsp: Copy> Slot<Req, Rsp> {
    #[inline]
    pub fn write_req(&mut self, req: Req) {
        self.req = req;
    }

    #[inline]
    pub fn read_req(&self) -> Req {
        unsafe { self.req }
    }

    #[inline]
    pub fn write_rsp(&mut self, rsp: Rsp) {
        self.rsp = rsp;
    }

    #[inline]
    pub fn read_rsp(&self) -> Rsp {
        unsafe { self.rsp }
    }
}

impl<Req: Copy + Default, Rsp: Copy> Default for Slot<Req, Rsp> {
    fn default() -> Self {
        Slot { req: Req::default() }
    }
}
