use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of raw bytes in a SHA-1 object id.
pub const SHA1_LEN: usize = 20;
/// Number of raw bytes in a SHA-256 object id.
pub const SHA256_LEN: usize = 32;

/// Content-addressed identifier for a stored object.
///
/// An `ObjectId` is the cryptographic digest of an object's canonical header
/// and content. Identical content always produces the same `ObjectId`, making
/// objects deduplicatable and verifiable. The id carries its digest width:
/// 20 bytes for the legacy SHA-1 format, 32 bytes for SHA-256 repositories.
///
/// Ordering is unsigned lexicographic over the raw digest bytes, which is the
/// order pack indexes and multi-pack-indexes store their id tables in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectId {
    Sha1([u8; SHA1_LEN]),
    Sha256([u8; SHA256_LEN]),
}

impl ObjectId {
    /// Create an id from a raw SHA-1 digest.
    pub const fn from_sha1(digest: [u8; SHA1_LEN]) -> Self {
        Self::Sha1(digest)
    }

    /// Create an id from a raw SHA-256 digest.
    pub const fn from_sha256(digest: [u8; SHA256_LEN]) -> Self {
        Self::Sha256(digest)
    }

    /// Create an id from raw digest bytes, inferring the width.
    pub fn from_raw(bytes: &[u8]) -> Result<Self, TypeError> {
        match bytes.len() {
            SHA1_LEN => {
                let mut digest = [0u8; SHA1_LEN];
                digest.copy_from_slice(bytes);
                Ok(Self::Sha1(digest))
            }
            SHA256_LEN => {
                let mut digest = [0u8; SHA256_LEN];
                digest.copy_from_slice(bytes);
                Ok(Self::Sha256(digest))
            }
            n => Err(TypeError::InvalidLength(n)),
        }
    }

    /// The null SHA-1 id (all zeros). Represents "no object".
    pub const fn null_sha1() -> Self {
        Self::Sha1([0u8; SHA1_LEN])
    }

    /// The null SHA-256 id (all zeros).
    pub const fn null_sha256() -> Self {
        Self::Sha256([0u8; SHA256_LEN])
    }

    /// Returns `true` if every digest byte is zero.
    pub fn is_null(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(d) => d,
            Self::Sha256(d) => d,
        }
    }

    /// Raw digest width in bytes (20 or 32).
    pub fn raw_len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Hex digest width (40 or 64 characters).
    pub fn hex_len(&self) -> usize {
        self.raw_len() * 2
    }

    /// First byte of the digest, the fan-out bucket key.
    pub fn first_byte(&self) -> u8 {
        self.as_bytes()[0]
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.as_bytes()[..4])
    }

    /// Parse from a full-length hex string (40 or 64 characters).
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_raw(&bytes)
    }

    /// Whether this id's hex form starts with `prefix` (case-insensitive).
    ///
    /// Used for abbreviated-id resolution; an empty prefix matches everything.
    pub fn matches_hex_prefix(&self, prefix: &str) -> bool {
        if prefix.len() > self.hex_len() {
            return false;
        }
        let hex = self.to_hex();
        hex.as_bytes()
            .iter()
            .zip(prefix.as_bytes())
            .all(|(h, p)| *h == p.to_ascii_lowercase())
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; SHA1_LEN]> for ObjectId {
    fn from(digest: [u8; SHA1_LEN]) -> Self {
        Self::Sha1(digest)
    }
}

impl From<[u8; SHA256_LEN]> for ObjectId {
    fn from(digest: [u8; SHA256_LEN]) -> Self {
        Self::Sha256(digest)
    }
}
