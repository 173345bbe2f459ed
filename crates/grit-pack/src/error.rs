use thiserror::Error;

use grit_types::ObjectId;

/// Errors from applying or building binary deltas.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("delta truncated")]
    Truncated,

    /// A size varint carried too many continuation bytes or overflowed.
    #[error("delta varint overflow")]
    VarintOverflow,

    #[error("delta base size mismatch: declared {declared}, actual {actual}")]
    BaseSizeMismatch { declared: u64, actual: u64 },

    #[error("delta result size mismatch: declared {declared}, produced {produced}")]
    ResultSizeMismatch { declared: u64, produced: u64 },

    /// Command byte zero is reserved and never valid.
    #[error("delta command byte zero")]
    ZeroCommand,

    #[error("delta copy out of base bounds")]
    CopyOutOfRange,

    #[error("delta output exceeds declared result size")]
    OutputOverrun,
}

/// Errors from pack file and index operations.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid magic in {file}: expected {expected:?}")]
    InvalidMagic { file: &'static str, expected: &'static str },

    #[error("unsupported {file} version: {version}")]
    UnsupportedVersion { file: &'static str, version: u32 },

    #[error("corrupt pack at offset {offset}: {reason}")]
    CorruptPack { offset: u64, reason: String },

    #[error("corrupt pack index: {0}")]
    IndexCorrupted(String),

    #[error("corrupt multi-pack-index: {0}")]
    MidxCorrupted(String),

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error("delta base not found: {0}")]
    DeltaBaseNotFound(ObjectId),

    /// The delta chain exceeded the configured resolution depth.
    #[error("delta chain deeper than {max} entries")]
    DeltaChainTooDeep { max: usize },

    /// An offset-delta chain revisited an entry, which can never terminate.
    #[error("cyclic delta chain at offset {offset}")]
    CyclicDelta { offset: u64 },

    /// The open-handle cap was reached and nothing could be evicted.
    #[error("open pack handle limit reached")]
    ResourceExhausted,

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    /// Error raised by an external base resolver (e.g. the ODB router
    /// probing other backends for a ref-delta base). Carried opaquely so
    /// the caller that owns the resolver can recover its own error type.
    #[error("{0}")]
    External(Box<dyn std::error::Error + Send + Sync>),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

impl PackError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptPack {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(
        op: &'static str,
        path: impl Into<std::path::PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { op, path, source }
    }
}

/// Result alias for pack operations.
pub type PackResult<T> = Result<T, PackError>;
