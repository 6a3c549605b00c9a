use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlkError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlkError {
    #[error("ring is full")]
    RingFull,

    #[error("shadow ring has no free slots")]
    ShadowExhausted,

    #[error("a control call is already in flight")]
    ProbeInProgress,

    #[error("request rejected: {0}")]
    InvalidRequest(&'static str),

    #[error(transparent)]
    Ring(#[from] xsplit_ring::RingError),

    #[error(transparent)]
    Grant(#[from] xsplit_grant::GrantError),
}

impl BlkError {
    /// Ring corruption and grant faults are fatal for the interface
    /// (spec §7 "Fatal"); everything else here is either transient
    /// (ring full, shadow exhausted) or policy (invalid request).
    pub fn is_fatal(&self) -> bool {
        match self {
            BlkError::Ring(e) => e.is_fatal(),
            BlkError::Grant(_) => false,
            _ => false,
        }
    }
}
