use sha1::Digest;

use grit_types::{ObjectId, ObjectKind};

use crate::error::{HashError, HashResult};

/// Digest algorithm selection, fixed per repository at open time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// Legacy 20-byte digest used by the vast majority of repositories.
    Sha1,
    /// 32-byte digest for modern-format repositories.
    Sha256,
}

impl HashAlgorithm {
    /// Raw digest width in bytes.
    pub fn raw_len(&self) -> usize {
        match self {
            Self::Sha1 => grit_types::oid::SHA1_LEN,
            Self::Sha256 => grit_types::oid::SHA256_LEN,
        }
    }

    /// Hex digest width in characters.
    pub fn hex_len(&self) -> usize {
        self.raw_len() * 2
    }

    /// The all-zero id of this width.
    pub fn null_id(&self) -> ObjectId {
        match self {
            Self::Sha1 => ObjectId::null_sha1(),
            Self::Sha256 => ObjectId::null_sha256(),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha1 => f.write_str("sha1"),
            Self::Sha256 => f.write_str("sha256"),
        }
    }
}

enum State {
    Sha1(sha1::Sha1),
    /// Collision-detecting SHA-1. Produces digests identical to plain SHA-1
    /// on benign input, but refuses to finalize when the input exhibits a
    /// known collision-attack structure.
    Sha1Checked(Box<sha1_checked::Sha1>),
    Sha256(sha2::Sha256),
}

/// Incremental digest context.
///
/// `update` may be called any number of times with chunks of any size; the
/// digest depends only on the concatenated byte stream. `finalize` consumes
/// the context -- a finalized hasher cannot be reused.
pub struct Hasher {
    state: State,
}

impl Hasher {
    /// Create a context for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha1 => State::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => State::Sha256(sha2::Sha256::new()),
        };
        Self { state }
    }

    /// Create a collision-detecting context.
    ///
    /// For SHA-1 this uses the hardened implementation; SHA-256 has no known
    /// collision attacks and uses the plain implementation.
    pub fn new_detecting(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha1 => State::Sha1Checked(Box::new(sha1_checked::Sha1::new())),
            HashAlgorithm::Sha256 => State::Sha256(sha2::Sha256::new()),
        };
        Self { state }
    }

    /// Feed bytes into the digest.
    pub fn update(&mut self, bytes: &[u8]) {
        match &mut self.state {
            State::Sha1(h) => h.update(bytes),
            State::Sha1Checked(h) => h.update(bytes),
            State::Sha256(h) => h.update(bytes),
        }
    }

    /// Consume the context and produce the object id.
    ///
    /// Fails with [`HashError::Collision`] only for the detecting SHA-1
    /// variant on crafted input; valid input never fails.
    pub fn finalize(self) -> HashResult<ObjectId> {
        match self.state {
            State::Sha1(h) => {
                let digest: [u8; 20] = h.finalize().into();
                Ok(ObjectId::from_sha1(digest))
            }
            State::Sha1Checked(h) => match h.try_finalize() {
                sha1_checked::CollisionResult::Ok(digest) => {
                    Ok(ObjectId::from_sha1(digest.into()))
                }
                sha1_checked::CollisionResult::Mitigated(_)
                | sha1_checked::CollisionResult::Collision(_) => Err(HashError::Collision),
            },
            State::Sha256(h) => {
                let digest: [u8; 32] = h.finalize().into();
                Ok(ObjectId::from_sha256(digest))
            }
        }
    }
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.state {
            State::Sha1(_) => "sha1",
            State::Sha1Checked(_) => "sha1-checked",
            State::Sha256(_) => "sha256",
        };
        f.debug_struct("Hasher").field("algorithm", &name).finish()
    }
}

/// Canonical object header: `"<kind> <length>\0"`.
///
/// This header prefixes the content both on disk (loose objects) and in the
/// digest that names the object.
pub fn object_header(kind: ObjectKind, len: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(16);
    header.extend_from_slice(kind.token().as_bytes());
    header.push(b' ');
    header.extend_from_slice(len.to_string().as_bytes());
    header.push(0);
    header
}

/// Compute the id of an object from its kind and content.
pub fn hash_object(algorithm: HashAlgorithm, kind: ObjectKind, data: &[u8]) -> ObjectId {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(&object_header(kind, data.len() as u64));
    hasher.update(data);
    // Plain digests never fail on valid input.
    hasher.finalize().expect("non-detecting digest cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_known_vector() {
        let mut hasher = Hasher::new(HashAlgorithm::Sha1);
        hasher.update(b"abc");
        let id = hasher.finalize().unwrap();
        assert_eq!(id.to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn sha256_known_vector() {
        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        hasher.update(b"abc");
        let id = hasher.finalize().unwrap();
        assert_eq!(
            id.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digest_is_chunking_independent() {
        let mut one = Hasher::new(HashAlgorithm::Sha1);
        one.update(b"hello world");
        let mut many = Hasher::new(HashAlgorithm::Sha1);
        many.update(b"hel");
        many.update(b"");
        many.update(b"lo wor");
        many.update(b"ld");
        assert_eq!(one.finalize().unwrap(), many.finalize().unwrap());
    }

    #[test]
    fn empty_blob_id_matches_legacy_format() {
        let id = hash_object(HashAlgorithm::Sha1, ObjectKind::Blob, b"");
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn empty_tree_id_matches_legacy_format() {
        let id = hash_object(HashAlgorithm::Sha1, ObjectKind::Tree, b"");
        assert_eq!(id.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn header_format() {
        assert_eq!(object_header(ObjectKind::Blob, 11), b"blob 11\0");
        assert_eq!(object_header(ObjectKind::Commit, 0), b"commit 0\0");
    }

    #[test]
    fn detecting_sha1_matches_plain_on_benign_input() {
        let data = b"perfectly ordinary bytes";
        let mut plain = Hasher::new(HashAlgorithm::Sha1);
        plain.update(data);
        let mut checked = Hasher::new_detecting(HashAlgorithm::Sha1);
        checked.update(data);
        assert_eq!(plain.finalize().unwrap(), checked.finalize().unwrap());
    }

    #[test]
    fn detecting_sha256_is_plain_sha256() {
        let mut checked = Hasher::new_detecting(HashAlgorithm::Sha256);
        checked.update(b"abc");
        let id = checked.finalize().unwrap();
        assert_eq!(id.raw_len(), 32);
    }

    #[test]
    fn kinds_produce_distinct_ids_for_same_content() {
        let blob = hash_object(HashAlgorithm::Sha1, ObjectKind::Blob, b"same");
        let tree = hash_object(HashAlgorithm::Sha1, ObjectKind::Tree, b"same");
        assert_ne!(blob, tree);
    }

    #[test]
    fn algorithm_widths() {
        assert_eq!(HashAlgorithm::Sha1.raw_len(), 20);
        assert_eq!(HashAlgorithm::Sha256.raw_len(), 32);
        assert_eq!(HashAlgorithm::Sha1.hex_len(), 40);
        assert_eq!(HashAlgorithm::Sha256.null_id().raw_len(), 32);
    }
}
