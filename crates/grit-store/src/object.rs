use grit_hash::HashAlgorithm;
use grit_types::{ObjectId, ObjectKind};

/// A logical object: kind tag plus content bytes.
///
/// `RawObject` is the unit every backend stores and returns. The store never
/// interprets the content -- tree/commit/tag structure is a concern of higher
/// layers. The id invariant is
/// `id == hash("<kind> <len>\0" || content)`, verified whenever bytes cross a
/// trust boundary (after inflate, after delta application).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawObject {
    /// The kind of this object.
    pub kind: ObjectKind,
    /// The content bytes, without the loose header.
    pub data: Vec<u8>,
}

impl RawObject {
    /// Create an object from kind and content.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Content length in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Compute the content-addressed id under the given algorithm.
    pub fn compute_id(&self, algorithm: HashAlgorithm) -> ObjectId {
        grit_hash::hash_object(algorithm, self.kind, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic() {
        let obj = RawObject::new(ObjectKind::Blob, b"deterministic".to_vec());
        assert_eq!(
            obj.compute_id(HashAlgorithm::Sha1),
            obj.compute_id(HashAlgorithm::Sha1)
        );
    }

    #[test]
    fn id_depends_on_kind() {
        let blob = RawObject::new(ObjectKind::Blob, b"same data".to_vec());
        let tag = RawObject::new(ObjectKind::Tag, b"same data".to_vec());
        assert_ne!(
            blob.compute_id(HashAlgorithm::Sha1),
            tag.compute_id(HashAlgorithm::Sha1)
        );
    }

    #[test]
    fn id_width_follows_algorithm() {
        let obj = RawObject::new(ObjectKind::Blob, b"x".to_vec());
        assert_eq!(obj.compute_id(HashAlgorithm::Sha1).raw_len(), 20);
        assert_eq!(obj.compute_id(HashAlgorithm::Sha256).raw_len(), 32);
    }

    #[test]
    fn size_matches_content() {
        let obj = RawObject::new(ObjectKind::Blob, vec![0u8; 1234]);
        assert_eq!(obj.size(), 1234);
    }
}
