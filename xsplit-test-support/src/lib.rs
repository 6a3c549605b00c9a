//! Shared test doubles for exercising the split-driver crates together:
//! re-exports of each crate's simulated hypervisor plus a manual clock
//! for deterministic credit-shaping tests that span process time.

pub use xsplit_grant::hypervisor::sim::SimHypervisor;
pub use xsplit_netback::hypervisor::sim::SimNetBackHypervisor;
pub use xsplit_netfront::hypervisor::sim::SimNetHypervisor;
pub use xsplit_state::MemConfigStore;

pub mod clock;
