//! Byte-budgeted cache for resolved delta bases.
//!
//! Hot bases are reused across many deltas in the same chain fan-out, so
//! each open pack keeps recently resolved full objects keyed by entry
//! offset. Eviction is least-recently-used within a byte budget; objects
//! larger than a quarter of the budget are never cached.

use std::collections::HashMap;

use grit_store::RawObject;

/// Default budget for a pack's base cache.
pub const DEFAULT_BASE_CACHE_BYTES: usize = 16 * 1024 * 1024;

struct CacheSlot {
    object: RawObject,
    last_used: u64,
}

pub(crate) struct BaseCache {
    budget: usize,
    used: usize,
    tick: u64,
    slots: HashMap<u64, CacheSlot>,
}

impl BaseCache {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            tick: 0,
            slots: HashMap::new(),
        }
    }

    pub(crate) fn get(&mut self, offset: u64) -> Option<RawObject> {
        self.tick += 1;
        let tick = self.tick;
        let slot = self.slots.get_mut(&offset)?;
        slot.last_used = tick;
        Some(slot.object.clone())
    }

    pub(crate) fn put(&mut self, offset: u64, object: &RawObject) {
        let size = object.data.len();
        if size > self.budget / 4 || self.slots.contains_key(&offset) {
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
                tracing::debug!(offset = victim, "evicting cached delta base");
            }
        }

        self.tick += 1;
        self.used += size;
        self.slots.insert(
            offset,
            CacheSlot {
                object: object.clone(),
                last_used: self.tick,
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_types::ObjectKind;

    fn blob(len: usize) -> RawObject {
        RawObject::new(ObjectKind::Blob, vec![0xaa; len])
    }

    #[test]
    fn get_after_put() {
        let mut cache = BaseCache::new(1024);
        cache.put(100, &blob(10));
        assert_eq!(cache.get(100).unwrap().data.len(), 10);
        assert!(cache.get(200).is_none());
    }

    #[test]
    fn oversized_objects_are_not_cached() {
        let mut cache = BaseCache::new(100);
        cache.put(1, &blob(50));
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn eviction_is_least_recently_used() {
        let mut cache = BaseCache::new(100);
        cache.put(1, &blob(20));
        cache.put(2, &blob(20));
        cache.put(3, &blob(20));
        // Touch 1 so 2 becomes the eviction victim.
        cache.get(1);
        cache.put(4, &blob(60));

        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_none());
        assert!(cache.get(4).is_some());
    }

    #[test]
    fn used_bytes_stay_within_budget() {
        let mut cache = BaseCache::new(100);
        for i in 0..50 {
            cache.put(i, &blob(20));
        }
        assert!(cache.used <= 100);
        assert!(cache.len() <= 5);
    }
}
