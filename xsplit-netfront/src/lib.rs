//! Network frontend: TX credit-free submission with aggressive
//! notification, and RX zero-copy page-flip delivery with an
//! exponential-increase/linear-decrease fill target (spec §4.6).

pub mod carrier;
pub mod error;
pub mod hypervisor;
pub mod rx;
pub mod tx;
pub mod wire;

pub use carrier::{announce_carrier, build_gratuitous_arp, PacketSink};
pub use error::{NetFrontError, Result};
pub use hypervisor::NetFrontHypercalls;
pub use rx::{FillTarget, RxFrontend, RxPacket};
pub use tx::{TxBuffer, TxFrontend};
