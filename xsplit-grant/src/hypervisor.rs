//! The hypervisor boundary: actual grant-table hypercalls are out of
//! scope (spec §1), contracted only through this trait. A real backend
//! would implement it over the Xen grant table hypercall ABI; tests and
//! simulation use `SimHypervisor`.

/// Grant-table hypercalls the grant client drives.
pub trait GrantHypercalls: Send + Sync {
    /// Install a host-visible permission record granting `remote_domid`
    /// read (or read-write) access to `frame`.
    fn install_access(&self, grant_ref: u16, remote_domid: u32, frame: u64, write_ok: bool);

    /// Install a permission allowing `remote_domid` to take ownership of
    /// `frame` exactly once.
    fn install_transfer(&self, grant_ref: u16, remote_domid: u32, frame: u64);

    /// Revoke an access grant. Returns `false` if the remote domain still
    /// holds the mapping (caller must retry or mark the reference
    /// invalid per spec §4.2 `end_foreign_access`).
    fn revoke_access(&self, grant_ref: u16, was_readonly: bool) -> bool;

    /// Poll whether a transfer has been consumed by the remote domain.
    /// Returns the frame the remote domain handed back, once available.
    fn poll_transfer_consumed(&self, grant_ref: u16) -> Option<u64>;
}

/// In-memory simulation of the grant-table hypercall surface, for tests
/// and for running frontend/backend pairs in a single process.
pub mod sim {
    use super::GrantHypercalls;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Copy)]
    enum SimEntry {
        Access { remote_domid: u32, frame: u64, write_ok: bool, mapped_by_remote: bool },
        Transfer { remote_domid: u32, frame: u64, consumed_frame: Option<u64> },
    }

    /// A same-process stand-in for the hypervisor's grant table. Remote
    /// mappings/consumption are simulated by calling `remote_map` /
    /// `remote_consume_transfer` from "the other side" in tests.
    #[derive(Default)]
    pub struct SimHypervisor {
        entries: Mutex<HashMap<u16, SimEntry>>,
    }

    impl SimHypervisor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulate the remote domain mapping an access grant (so that a
        /// subsequent `revoke_access` call observes it as still mapped).
        pub fn remote_map(&self, grant_ref: u16) {
            if let Some(SimEntry::Access { mapped_by_remote, .. }) =
                self.entries.lock().get_mut(&grant_ref)
            {
                *mapped_by_remote = true;
            }
        }

        pub fn remote_unmap(&self, grant_ref: u16) {
            if let Some(SimEntry::Access { mapped_by_remote, .. }) =
                self.entries.lock().get_mut(&grant_ref)
            {
                *mapped_by_remote = false;
            }
        }

        /// Simulate the remote domain consuming a transfer and handing
        /// back a (possibly different) frame.
        pub fn remote_consume_transfer(&self, grant_ref: u16, returned_frame: u64) {
            if let Some(SimEntry::Transfer { consumed_frame, .. }) =
                self.entries.lock().get_mut(&grant_ref)
            {
                *consumed_frame = Some(returned_frame);
            }
        }
    }

    impl GrantHypercalls for SimHypervisor {
        fn install_access(&self, grant_ref: u16, remote_domid: u32, frame: u64, write_ok: bool) {
            self.entries.lock().insert(
                grant_ref,
                SimEntry::Access { remote_domid, frame, write_ok, mapped_by_remote: false },
            );
        }

        fn install_transfer(&self, grant_ref: u16, remote_domid: u32, frame: u64) {
            self.entries
                .lock()
                .insert(grant_ref, SimEntry::Transfer { remote_domid, frame, consumed_frame: None });
        }

        fn revoke_access(&self, grant_ref: u16, _was_readonly: bool) -> bool {
            let mut entries = self.entries.lock();
            match entries.get(&grant_ref) {
                Some(SimEntry::Access { mapped_by_remote, .. }) if *mapped_by_remote => false,
                _ => {
                    entries.remove(&grant_ref);
                    true
                }
            }
        }

        fn poll_transfer_consumed(&self, grant_ref: u16) -> Option<u64> {
            let mut entries = self.entries.lock();
            match entries.get(&grant_ref) {
                Some(SimEntry::Transfer { consumed_frame: Some(f), .. }) => {
                    let frame = *f;
                    entries.remove(&grant_ref);
                    Some(frame)
                }
                _ => None,
            }
        }
    }
}
