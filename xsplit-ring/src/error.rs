//! Error types for the ring transport.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RingError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("ring is full")]
    Full,

    #[error("ring is empty")]
    Empty,

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("ring corrupt on interface {interface}: req_prod - req_cons ({delta}) exceeds capacity ({capacity})")]
    Corrupt { interface: u32, delta: u64, capacity: u64 },
}

impl RingError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Classification used by callers to decide propagation (spec §7).
    ///
    /// `Full`/`Empty` are Transient; `Corrupt` is Fatal and must tear the
    /// interface down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RingError::Corrupt { .. })
    }
}
