use thiserror::Error;

/// Errors from digest operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    /// The collision-detecting digest flagged a crafted input.
    ///
    /// This is always fatal for the caller: the digest that would have been
    /// produced is withheld, and the error must never be treated as a
    /// not-found condition.
    #[error("SHA-1 collision attack detected")]
    Collision,
}

/// Result alias for digest operations.
pub type HashResult<T> = Result<T, HashError>;
