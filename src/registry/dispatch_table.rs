//! The process-wide dispatchable-handle table.
//!
//! This is the one piece of truly global state the layer needs (`spec.md` §9,
//! "Global state"): the loader's ABI requires that every dispatchable handle's
//! first machine word be a key it can use to route calls, and the layer must be
//! able to map that same key back to its own shadow object from *any* entry
//! point, without knowing which device or instance created the handle up front.
//!
//! It is specified as a single explicit module-level singleton, initialized on
//! first instance creation and torn down when the last instance is destroyed.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

/// A shadow object reachable through the dispatchable-handle table. Stored as
/// `Arc<dyn Any + Send + Sync>` so instances, devices, queues and command buffers
/// can share one table without a closed enum coupling this module to all of them.
pub type DynShadow = Arc<dyn Any + Send + Sync>;

/// The process-wide dispatchable-handle table.
///
/// Entries are inserted during `CreateDevice`/`CreateInstance` and removed
/// during `DestroyDevice`/`DestroyInstance` (`spec.md` §4.1). Queues and
/// command buffers are dispatchable too but deliberately never go in this
/// table: a loader may reuse a device's own dispatch-key word for every queue
/// and command buffer retrieved from it, and this table has no way to
/// disambiguate two different shadow kinds sharing one key. `registry::loader`
/// keeps a separate routing table for those, keyed by the sub-object's own
/// handle value instead of a dispatch key.
#[derive(Default)]
pub struct DispatchTable {
    entries: RwLock<HashMap<u64, DynShadow>>,
}

impl DispatchTable {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a shadow object under its dispatch key. Returns the previous
    /// entry, if any (there should never be one — a collision means the loader
    /// handed back a key that is still registered, which is an invariant
    /// violation in the caller).
    pub fn insert(&self, key: u64, shadow: DynShadow) -> Option<DynShadow> {
        self.entries.write().insert(key, shadow)
    }

    /// Remove the entry for `key`, returning it if present.
    pub fn remove(&self, key: u64) -> Option<DynShadow> {
        self.entries.write().remove(&key)
    }

    /// Look up the shadow object for `key` and downcast it to `T`. Returns `None`
    /// if the key is not registered or registered under a different concrete type.
    pub fn get<T: Any + Send + Sync>(&self, key: u64) -> Option<Arc<T>> {
        let entries = self.entries.read();
        let shadow = entries.get(&key)?.clone();
        drop(entries);
        shadow.downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static TABLE: OnceCell<DispatchTable> = OnceCell::new();

/// Access the process-wide dispatch table, initializing it on first use (i.e. at
/// the first `CreateInstance` call in a real layer load).
pub fn dispatch_table() -> &'static DispatchTable {
    TABLE.get_or_init(DispatchTable::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Fake(u32);

    #[test]
    fn insert_get_remove_roundtrip() {
        let table = DispatchTable::new();
        assert!(table.get::<Fake>(1).is_none());
        table.insert(1, Arc::new(Fake(42)));
        assert_eq!(*table.get::<Fake>(1).unwrap(), Fake(42));
        let removed = table.remove(1).unwrap();
        assert_eq!(*removed.downcast::<Fake>().unwrap(), Fake(42));
        assert!(table.get::<Fake>(1).is_none());
    }

    #[test]
    fn downcast_mismatch_returns_none() {
        struct Other;
        let table = DispatchTable::new();
        table.insert(5, Arc::new(Fake(1)));
        assert!(table.get::<Other>(5).is_none());
    }
}
