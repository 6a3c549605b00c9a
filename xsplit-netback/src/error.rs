use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetBackError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetBackError {
    #[error("unknown interface {0}")]
    UnknownInterface(u32),

    #[error("pending ring exhausted")]
    PendingExhausted,

    #[error(transparent)]
    Ring(#[from] xsplit_ring::RingError),
}

impl NetBackError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, NetBackError::Ring(e) if e.is_fatal())
    }
}
