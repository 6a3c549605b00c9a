//! Shared connection state machine and configuration store (spec §4.4,
//! §4.9, §6).

pub mod config;
pub mod error;
pub mod machine;

pub use config::{ConfigEvent, ConfigKey, ConfigStore, MemConfigStore};
pub use error::{Result, StateError};
pub use machine::{ConnState, Event, InterfaceOps, StateMachine};
