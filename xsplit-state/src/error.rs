use thiserror::Error;

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid configuration key: {0}")]
    InvalidConfig(String),

    #[error("state-machine invariant violated: {0}")]
    InvariantViolated(String),
}
