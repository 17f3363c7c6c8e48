//! Per-device, per-category object map for non-dispatchable handles.
//!
//! Lookups take the shared lock; insertion and removal take the exclusive lock
//! (`spec.md` §4.1). Shadow objects containing cross-references are only ever
//! created or destroyed while the map's exclusive lock is held.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

/// A `handle -> shadow` table for one Vulkan object category on one device.
///
/// Entries are stored as `Arc<V>` rather than uniquely-owned boxes: the device's
/// map is the single owner in practice (nothing else holds a strong reference
/// while the object is live), but using `Arc` lets cross-references elsewhere in
/// the object graph (`ImageView` -> `Framebuffer`, `DescriptorSet` -> bound
/// resources) hold a [`std::sync::Weak`] into the same allocation instead of an
/// unsafe raw pointer, which is what `spec.md` §9 calls an
/// "arena+weak-index relationship".
pub struct ObjectMap<K: Eq + Hash + Clone, V> {
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K: Eq + Hash + Clone, V> Default for ObjectMap<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V> ObjectMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly built shadow under `key`. Exclusive.
    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.write().insert(key, value.clone());
        value
    }

    /// Remove the shadow for `key`, if present, transferring ownership out of the
    /// map. Exclusive. The caller is responsible for running destruction
    /// bookkeeping before the last `Arc` reference drops.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.entries.write().remove(key)
    }

    /// Look up the shadow for `key`. Shared.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every live value, in unspecified order. Used by GUI listings.
    pub fn values(&self) -> Vec<Arc<V>> {
        self.entries.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_bijection_create_destroy() {
        let map: ObjectMap<u64, String> = ObjectMap::new();
        assert!(map.get(&1).is_none());
        let inserted = map.insert(1, "buffer".to_string());
        assert_eq!(*inserted, "buffer");
        assert_eq!(map.get(&1).as_deref(), Some(&"buffer".to_string()));
        let removed = map.remove(&1).unwrap();
        assert_eq!(*removed, "buffer");
        assert!(map.get(&1).is_none());
    }

    #[test]
    fn disjoint_handles_do_not_interfere() {
        let map: ObjectMap<u64, u32> = ObjectMap::new();
        map.insert(1, 10);
        map.insert(2, 20);
        map.remove(&1);
        assert!(map.get(&1).is_none());
        assert_eq!(map.get(&2).map(|v| *v), Some(20));
    }
}
