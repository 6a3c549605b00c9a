//! Error types for the grant table client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GrantError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrantError {
    #[error("no grant references available in pool")]
    NoSpace,

    #[error("pool exhausted: claim on empty free list")]
    PoolEmpty,

    #[error("double release of grant reference {0}")]
    DoubleRelease(u16),

    #[error("grant reference {0} is not currently granted")]
    NotGranted(u16),

    #[error("remote domain still holds the mapping for reference {0}")]
    StillMapped(u16),

    #[error("grant reference {0} is marked invalid and must be re-established")]
    Invalid(u16),

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl GrantError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }
}
