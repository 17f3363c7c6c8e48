//! GUI-facing surface (component I, `spec.md` §4.9): read-only snapshot
//! accessors for the (external) renderer, and the `extern "C"` public API a
//! host application uses to drive the overlay.
//!
//! Grounded on `original_source/gui.hpp`'s `Renderer::selected.cb`
//! (`{cb, selectTabCounter}`, a selected command buffer plus invalidation
//! bookkeeping) for [`Selection`], and on `original_source/api.h`'s `FuenApi`
//! function-pointer table for [`abi`]'s exported functions, renamed to this
//! crate's own `vklens_` prefix.

pub mod abi;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::command::command_buffer::CommandBuffer;
use crate::command::node::NodeId;
use crate::objects::handle::Nameable;
use crate::registry::ObjectMap;
use crate::util::id::ObjectId;

/// Tracks the command currently pinned for inspection: which command buffer,
/// which generation of its record (`reset_count`), and the node id within
/// that record. Reading through a stale selection — the command buffer moved
/// on to a new recording, or was destroyed — returns `None` rather than a
/// dangling view (`spec.md` §4.9).
#[derive(Default)]
pub struct Selection {
    inner: Mutex<Option<SelectionState>>,
}

struct SelectionState {
    command_buffer: Weak<CommandBuffer>,
    reset_count: u64,
    node: NodeId,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, command_buffer: &Arc<CommandBuffer>, node: NodeId) {
        *self.inner.lock() = Some(SelectionState {
            command_buffer: Arc::downgrade(command_buffer),
            reset_count: command_buffer.reset_count(),
            node,
        });
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }

    pub fn is_selected(&self) -> bool {
        self.current().is_some()
    }

    /// The selection if it's still valid — the command buffer is alive and
    /// hasn't been reset/re-recorded since selection. An invalid selection is
    /// dropped on read so repeated polling doesn't keep re-discovering it.
    pub fn current(&self) -> Option<(Arc<CommandBuffer>, NodeId)> {
        let mut guard = self.inner.lock();
        let state = guard.as_ref()?;
        let cb = state.command_buffer.upgrade();
        match cb {
            Some(cb) if cb.reset_count() == state.reset_count => Some((cb, state.node)),
            _ => {
                *guard = None;
                None
            }
        }
    }

    /// Clears the selection if it currently points at `command_buffer` —
    /// called from the object graph's destroy path (mirrors
    /// `original_source/gui.hpp`'s `Renderer::unselect`).
    pub fn unselect_if(&self, command_buffer: &Arc<CommandBuffer>) {
        let mut guard = self.inner.lock();
        if let Some(state) = guard.as_ref() {
            if state.command_buffer.upgrade().is_some_and(|cb| Arc::ptr_eq(&cb, command_buffer)) {
                *guard = None;
            }
        }
    }
}

/// One entry in a resource-listing snapshot: a stable sort key plus the
/// debug name, if any (`original_source/gui.hpp`'s `drawResourceSelectorUI`).
#[derive(Debug, Clone)]
pub struct ListedObject {
    pub id: ObjectId,
    pub name: String,
}

/// Snapshot every live object in one category for the resource browser.
/// Shared-locks the map once and releases it before returning — the listing
/// is a point-in-time copy, not a live view.
pub fn list_objects<K, V>(map: &ObjectMap<K, V>) -> Vec<ListedObject>
where
    K: Eq + std::hash::Hash + Clone,
    V: Nameable,
{
    map.values()
        .into_iter()
        .map(|v| ListedObject {
            id: v.meta().id(),
            name: v.meta().name(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::command_pool::CommandPool;

    fn new_cb() -> Arc<CommandBuffer> {
        let pool = Arc::new(CommandPool::new(ash::vk::CommandPool::null(), 0));
        Arc::new(CommandBuffer::new(ash::vk::CommandBuffer::null(), Arc::downgrade(&pool), true))
    }

    #[test]
    fn selection_reads_back_what_was_selected() {
        let cb = new_cb();
        cb.begin().unwrap();
        let selection = Selection::new();
        assert!(!selection.is_selected());
        selection.select(&cb, 42);
        let (found, node) = selection.current().unwrap();
        assert!(Arc::ptr_eq(&found, &cb));
        assert_eq!(node, 42);
    }

    #[test]
    fn selection_invalidates_when_record_generation_advances() {
        let cb = new_cb();
        cb.begin().unwrap();
        let selection = Selection::new();
        selection.select(&cb, 1);
        cb.end(&crate::config::LayerConfig::default()).unwrap();
        cb.reset().unwrap();
        assert!(selection.current().is_none());
    }

    #[test]
    fn selection_invalidates_when_command_buffer_is_dropped() {
        let cb = new_cb();
        cb.begin().unwrap();
        let selection = Selection::new();
        selection.select(&cb, 1);
        drop(cb);
        assert!(selection.current().is_none());
    }

    #[test]
    fn unselect_if_only_clears_matching_selection() {
        let a = new_cb();
        let b = new_cb();
        a.begin().unwrap();
        b.begin().unwrap();
        let selection = Selection::new();
        selection.select(&a, 1);
        selection.unselect_if(&b);
        assert!(selection.is_selected());
        selection.unselect_if(&a);
        assert!(!selection.is_selected());
    }

    #[test]
    fn list_objects_reports_names() {
        let map: ObjectMap<u64, CommandBuffer> = ObjectMap::new();
        let cb = map.insert(1, CommandBuffer::new(ash::vk::CommandBuffer::null(), Weak::new(), true));
        cb.meta().set_name("main-cb");
        let listed = list_objects(&map);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "main-cb");
    }
}
