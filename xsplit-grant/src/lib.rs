//! Grant-reference page-sharing client.
//!
//! Reserves 16-bit reference numbers, pools them per direction, and
//! drives the out-of-scope hypervisor grant table (`GrantHypercalls`)
//! through install/revoke/transfer operations (spec §4.2).

pub mod client;
pub mod error;
pub mod hypervisor;
pub mod pool;

pub use client::{GrantClient, RefState};
pub use error::{GrantError, Result};
pub use hypervisor::GrantHypercalls;
pub use pool::Pool;
