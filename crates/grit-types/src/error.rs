use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid digest length: {0} bytes")]
    InvalidLength(usize),

    #[error("unknown object kind: {0}")]
    UnknownKind(String),
}
