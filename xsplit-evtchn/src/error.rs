use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvtchnError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvtchnError {
    #[error("port {0} is already bound")]
    AlreadyBound(u32),

    #[error("port {0} is not bound")]
    NotBound(u32),
}
