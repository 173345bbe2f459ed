use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::RwLock;

use grit_hash::HashAlgorithm;
use grit_types::{ObjectId, ObjectKind, Outcome};

use crate::error::StoreResult;
use crate::object::RawObject;

/// In-memory, HashMap-based object backend.
///
/// Used for staging objects without touching disk and throughout the test
/// suites. All objects are held behind a `RwLock` for safe concurrent
/// access; objects are cloned on read/write.
pub struct MemoryBackend {
    algorithm: HashAlgorithm,
    objects: RwLock<HashMap<ObjectId, RawObject>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the backend holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total content bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|obj| obj.size())
            .sum()
    }

    /// Return all ids, sorted.
    pub fn all_ids(&self) -> Vec<ObjectId> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Read a complete object by id; `Ok(None)` when absent.
    pub fn read(&self, id: &ObjectId) -> StoreResult<Option<RawObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    /// Read an object's kind and length without cloning its content.
    pub fn read_header(&self, id: &ObjectId) -> StoreResult<Option<(ObjectKind, u64)>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).map(|obj| (obj.kind, obj.size())))
    }

    /// Check whether an object exists.
    pub fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }

    /// Write an object; idempotent under content-addressing.
    pub fn write(&self, object: &RawObject) -> StoreResult<ObjectId> {
        let id = object.compute_id(self.algorithm);
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| object.clone());
        Ok(id)
    }

    /// Visit every object id in sorted order.
    pub fn foreach(
        &self,
        callback: &mut dyn FnMut(&ObjectId) -> ControlFlow<()>,
    ) -> StoreResult<Outcome> {
        // Snapshot the ids so the lock is not held across callbacks.
        for id in self.all_ids() {
            if callback(&id).is_break() {
                return Ok(Outcome::Stopped);
            }
        }
        Ok(Outcome::Completed)
    }

    /// Collect every id whose hex form starts with `prefix`.
    pub fn read_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map
            .keys()
            .filter(|id| id.matches_hex_prefix(prefix))
            .copied()
            .collect())
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(HashAlgorithm::Sha1)
    }

    fn blob(content: &[u8]) -> RawObject {
        RawObject::new(ObjectKind::Blob, content.to_vec())
    }

    #[test]
    fn write_and_read() {
        let store = backend();
        let obj = blob(b"hello world");
        let id = store.write(&obj).unwrap();
        assert_eq!(store.read(&id).unwrap().unwrap(), obj);
    }

    #[test]
    fn same_content_dedups() {
        let store = backend();
        let id1 = store.write(&blob(b"identical")).unwrap();
        let id2 = store.write(&blob(b"identical")).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn read_header_matches_object() {
        let store = backend();
        let id = store.write(&blob(b"12345")).unwrap();
        assert_eq!(
            store.read_header(&id).unwrap(),
            Some((ObjectKind::Blob, 5))
        );
    }

    #[test]
    fn missing_object_is_none() {
        let store = backend();
        assert!(store.read(&ObjectId::null_sha1()).unwrap().is_none());
        assert!(store.read_header(&ObjectId::null_sha1()).unwrap().is_none());
        assert!(!store.exists(&ObjectId::null_sha1()).unwrap());
    }

    #[test]
    fn foreach_is_sorted_and_stoppable() {
        let store = backend();
        for i in 0..6 {
            store.write(&blob(format!("{i}").as_bytes())).unwrap();
        }

        let mut seen = Vec::new();
        let outcome = store
            .foreach(&mut |id| {
                seen.push(*id);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(seen.len(), 6);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        let outcome = store
            .foreach(&mut |_| ControlFlow::Break(()))
            .unwrap();
        assert_eq!(outcome, Outcome::Stopped);
    }

    #[test]
    fn prefix_scan() {
        let store = backend();
        let id = store.write(&blob(b"prefix me")).unwrap();
        let hex = id.to_hex();
        assert_eq!(store.read_prefix(&hex[..10]).unwrap(), vec![id]);
        assert!(store.read_prefix("0123456789abcdef0123").unwrap().is_empty()
            || hex.starts_with("0123456789abcdef0123"));
    }

    #[test]
    fn total_bytes_sums_content() {
        let store = backend();
        store.write(&blob(b"12345")).unwrap();
        store.write(&blob(b"123456789")).unwrap();
        assert_eq!(store.total_bytes(), 14);
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(backend());
        let id = store.write(&blob(b"shared data")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let obj = store.read(&id).unwrap().unwrap();
                    assert_eq!(obj.compute_id(HashAlgorithm::Sha1), id);
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }
}
