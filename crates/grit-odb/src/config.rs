use grit_hash::HashAlgorithm;

/// Static configuration supplied when an object database is opened.
///
/// Nothing here is mutable per-call; a different configuration means a
/// different `Odb` instance.
#[derive(Clone, Copy, Debug)]
pub struct OdbConfig {
    /// Digest algorithm naming every object in this repository.
    pub algorithm: HashAlgorithm,
    /// Upper bound on delta-chain resolution depth.
    pub max_delta_depth: usize,
    /// Byte budget for the router's object content cache.
    pub cache_bytes: usize,
    /// Cap on concurrently open pack data handles.
    pub pack_handle_cap: usize,
    /// Re-verify loose object digests on read.
    pub strict_hash_verification: bool,
}

impl Default for OdbConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha1,
            max_delta_depth: grit_pack::DEFAULT_MAX_DELTA_DEPTH,
            cache_bytes: 8 * 1024 * 1024,
            pack_handle_cap: grit_pack::DEFAULT_HANDLE_CAP,
            strict_hash_verification: true,
        }
    }
}

impl OdbConfig {
    /// Configuration for a SHA-256 repository, other knobs at defaults.
    pub fn sha256() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            ..Self::default()
        }
    }
}
