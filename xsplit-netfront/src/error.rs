use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetFrontError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetFrontError {
    #[error("interface is not connected")]
    NotConnected,

    #[error("packet dropped: {0}")]
    Dropped(&'static str),

    #[error(transparent)]
    Ring(#[from] xsplit_ring::RingError),

    #[error(transparent)]
    Grant(#[from] xsplit_grant::GrantError),
}

impl NetFrontError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, NetFrontError::Ring(e) if e.is_fatal())
    }
}
