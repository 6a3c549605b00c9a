//! The pseudo-physical-memory / hypercall boundary the network frontend
//! drives for RX page flipping (spec §4.6 RX refill/delivery). Page
//! allocation, p2m updates, PTE installation, and the balloon
//! collaborator are all out of scope (spec §1) and contracted only
//! through this trait, mirroring `xsplit_grant::GrantHypercalls`.

pub trait NetFrontHypercalls: Send + Sync {
    /// Allocate a guest page and return its current machine frame.
    fn alloc_page(&self) -> u64;

    /// Remove `frames` from the pseudo-physical-to-machine mapping and
    /// inform the balloon collaborator of the reservation decrease, in
    /// one batched hypercall (spec §4.6 RX refill steps 3-4).
    fn batch_zap_and_decrease_reservation(&self, frames: &[u64]);

    /// Update the guest's pseudo-physical map entry for `page` to point
    /// at `machine_frame` (spec §4.6 RX delivery).
    fn update_p2m(&self, page: u64, machine_frame: u64);

    /// Install a page-table entry mapping `page` to `machine_frame`.
    fn install_pte(&self, page: u64, machine_frame: u64);
}

/// In-memory simulation for tests: pages are just sequential handles,
/// "machine frames" are simulated by the same counter space.
pub mod sim {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::NetFrontHypercalls;

    #[derive(Default)]
    pub struct SimNetHypervisor {
        next_page: AtomicU64,
    }

    impl SimNetHypervisor {
        pub fn new() -> Self {
            Self { next_page: AtomicU64::new(1) }
        }
    }

    impl NetFrontHypercalls for SimNetHypervisor {
        fn alloc_page(&self) -> u64 {
            self.next_page.fetch_add(1, Ordering::Relaxed)
        }

        fn batch_zap_and_decrease_reservation(&self, _frames: &[u64]) {}

        fn update_p2m(&self, _page: u64, _machine_frame: u64) {}

        fn install_pte(&self, _page: u64, _machine_frame: u64) {}
    }
}
