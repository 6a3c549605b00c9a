//! Network backend: credit-shaped TX admission with batched grant
//! mapping, and RX delivery with batched frame reservation and p2m
//! flips (spec §4.7, §4.8).

pub mod credit;
pub mod error;
pub mod hypervisor;
pub mod interface;
pub mod pending;
pub mod rx;
pub mod schedule;
pub mod tx;

pub use credit::{CreditOutcome, CreditShaper};
pub use error::{NetBackError, Result};
pub use hypervisor::{MapError, NetBackHypercalls};
pub use interface::InterfaceRecord;
pub use pending::{DeallocRing, PendingEntry, PendingRing};
pub use rx::{HostPacket, RxBackend};
pub use schedule::ScheduleList;
pub use tx::{DeliveredPacket, TxBackend};
