use grit_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object data is malformed or failed an integrity check.
    #[error("corrupt object: {reason}")]
    CorruptObject { reason: String },

    /// Content digest mismatch on read (data corruption or tampering).
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        expected: ObjectId,
        computed: ObjectId,
    },

    /// The collision-detecting digest flagged a crafted input.
    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    /// Write attempted against a backend that cannot accept writes.
    #[error("backend is read-only")]
    ReadOnly,

    /// I/O error from the underlying storage, with the operation context.
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptObject {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(op: &'static str, path: impl Into<std::path::PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
