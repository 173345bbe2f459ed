//! Bounded object content cache.
//!
//! Hot objects (commits and trees during a graph walk) are re-read
//! constantly; caching them skips repeated inflate and delta resolution.
//! Objects are immutable, so entries never invalidate -- eviction is purely
//! least-recently-used within a byte budget. Objects larger than a quarter
//! of the budget are not cached.

use std::collections::HashMap;

use grit_store::RawObject;
use grit_types::ObjectId;

struct CacheSlot {
    object: RawObject,
    last_used: u64,
}

pub(crate) struct ObjectCache {
    budget: usize,
    used: usize,
    tick: u64,
    slots: HashMap<ObjectId, CacheSlot>,
}

impl ObjectCache {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            tick: 0,
            slots: HashMap::new(),
        }
    }

    pub(crate) fn get(&mut self, id: &ObjectId) -> Option<RawObject> {
        self.tick += 1;
        let tick = self.tick;
        let slot = self.slots.get_mut(id)?;
        slot.last_used = tick;
        Some(slot.object.clone())
    }

    pub(crate) fn peek_header(&self, id: &ObjectId) -> Option<(grit_types::ObjectKind, u64)> {
        self.slots
            .get(id)
            .map(|slot| (slot.object.kind, slot.object.size()))
    }

    pub(crate) fn contains(&self, id: &ObjectId) -> bool {
        self.slots.contains_key(id)
    }

    pub(crate) fn put(&mut self, id: ObjectId, object: &RawObject) {
        let size = object.data.len();
        if size > self.budget / 4 || self.slots.contains_key(&id) {
            return;
        }

        while self.used + size > self.budget {
            let Some((&victim, _)) = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
            else {
                break;
            };
            if let Some(evicted) = self.slots.remove(&victim) {
                self.used -= evicted.object.data.len();
                tracing::debug!(id = %victim, "evicting cached object");
            }
        }

        self.tick += 1;
        self.used += size;
        self.slots.insert(
            id,
            CacheSlot {
                object: object.clone(),
                last_used: self.tick,
            },
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_types::ObjectKind;

    fn blob(len: usize, fill: u8) -> RawObject {
        RawObject::new(ObjectKind::Blob, vec![fill; len])
    }

    fn id(n: u8) -> ObjectId {
        ObjectId::from_sha1([n; 20])
    }

    #[test]
    fn get_returns_cached_object() {
        let mut cache = ObjectCache::new(1024);
        cache.put(id(1), &blob(10, 0xaa));
        assert_eq!(cache.get(&id(1)).unwrap().data, vec![0xaa; 10]);
        assert!(cache.get(&id(2)).is_none());
    }

    #[test]
    fn peek_header_does_not_clone_content() {
        let mut cache = ObjectCache::new(1024);
        cache.put(id(3), &blob(64, 0x11));
        assert_eq!(cache.peek_header(&id(3)), Some((ObjectKind::Blob, 64)));
        assert_eq!(cache.peek_header(&id(4)), None);
    }

    #[test]
    fn oversized_objects_skip_the_cache() {
        let mut cache = ObjectCache::new(100);
        cache.put(id(5), &blob(50, 0));
        assert!(!cache.contains(&id(5)));
    }

    #[test]
    fn lru_eviction_respects_recency() {
        let mut cache = ObjectCache::new(100);
        cache.put(id(1), &blob(20, 0));
        cache.put(id(2), &blob(20, 0));
        cache.put(id(3), &blob(20, 0));
        cache.get(&id(1));
        cache.put(id(4), &blob(60, 0));

        assert!(cache.contains(&id(1)));
        assert!(!cache.contains(&id(2)));
        assert!(cache.contains(&id(4)));
    }

    #[test]
    fn budget_is_never_exceeded() {
        let mut cache = ObjectCache::new(200);
        for i in 0..40 {
            cache.put(id(i), &blob(30, i));
        }
        assert!(cache.used <= 200);
        assert!(cache.len() <= 6);
    }
}
