//! Monotonically increasing object ids, used only to give GUI listings a stable
//! sort order across handle reuse (`spec.md` §3's "handle" data model, supplemented
//! per SPEC_FULL.md §3 from `original_source/handle.hpp`).

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique, ever-increasing id assigned to every shadow object at
/// creation. Vulkan handles can be reused after destruction; this cannot, so it is
/// safe to use as a stable sort/identity key in GUI listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}
