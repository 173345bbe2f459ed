use grit_pack::PackError;
use grit_store::StoreError;

/// Errors from object database operations.
///
/// Integrity failures (the corruption variants and [`OdbError::HashCollision`])
/// are never retried or downgraded; they propagate to the caller. Absence
/// during multi-backend probing is swallowed internally -- only the final
/// aggregate absence surfaces as [`OdbError::NotFound`].
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    /// The id (or prefix) matched nothing in any backend.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A short prefix matched more than one object.
    #[error("prefix {0:?} is ambiguous")]
    Ambiguous(String),

    /// A write was attempted with no writable backend available.
    #[error("object database is read-only")]
    ReadOnly,

    /// The collision-detecting digest flagged a crafted input. Always
    /// fatal; never to be treated as a missing object.
    #[error("SHA-1 collision attack detected")]
    HashCollision,

    /// The pack handle cap was reached and eviction could not free one.
    #[error("open pack handle limit reached")]
    ResourceExhausted,

    /// Loose-store failure (corruption, hash mismatch, I/O).
    #[error(transparent)]
    Store(StoreError),

    /// Pack-store failure (corrupt pack/index/delta, I/O).
    #[error(transparent)]
    Pack(PackError),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

impl From<StoreError> for OdbError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Hash(grit_hash::HashError::Collision) => Self::HashCollision,
            StoreError::ReadOnly => Self::ReadOnly,
            other => Self::Store(other),
        }
    }
}

impl From<PackError> for OdbError {
    fn from(err: PackError) -> Self {
        match err {
            PackError::Hash(grit_hash::HashError::Collision) => Self::HashCollision,
            PackError::ResourceExhausted => Self::ResourceExhausted,
            // Errors the router itself raised inside a base resolver come
            // back out with their original taxonomy.
            PackError::External(boxed) => match boxed.downcast::<OdbError>() {
                Ok(odb) => *odb,
                Err(other) => Self::Pack(PackError::External(other)),
            },
            other => Self::Pack(other),
        }
    }
}

impl OdbError {
    /// True for the corruption family that must never be skipped.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::HashCollision
                | Self::Store(StoreError::CorruptObject { .. })
                | Self::Store(StoreError::HashMismatch { .. })
                | Self::Pack(
                    PackError::CorruptPack { .. }
                        | PackError::IndexCorrupted(_)
                        | PackError::MidxCorrupted(_)
                        | PackError::ChecksumMismatch
                        | PackError::CrcMismatch { .. }
                        | PackError::Delta(_)
                        | PackError::CyclicDelta { .. }
                )
        )
    }
}

/// Result alias for object database operations.
pub type OdbResult<T> = Result<T, OdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_is_never_a_store_error() {
        let err: OdbError = StoreError::Hash(grit_hash::HashError::Collision).into();
        assert!(matches!(err, OdbError::HashCollision));
        let err: OdbError = PackError::Hash(grit_hash::HashError::Collision).into();
        assert!(matches!(err, OdbError::HashCollision));
    }

    #[test]
    fn external_errors_round_trip_through_pack_layer() {
        let original = OdbError::NotFound("abcd".into());
        let wrapped = PackError::External(Box::new(original));
        let recovered: OdbError = wrapped.into();
        assert!(matches!(recovered, OdbError::NotFound(p) if p == "abcd"));
    }

    #[test]
    fn corruption_predicate() {
        assert!(OdbError::HashCollision.is_corruption());
        assert!(OdbError::Pack(PackError::ChecksumMismatch).is_corruption());
        assert!(!OdbError::NotFound("x".into()).is_corruption());
        assert!(!OdbError::ReadOnly.is_corruption());
    }
}
