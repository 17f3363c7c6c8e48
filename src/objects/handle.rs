//! Common state every shadow object carries, per `spec.md` §3 "Handle".

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::util::id::ObjectId;

/// Debug name and opaque tag map set through `vkSetDebugUtilsObjectNameEXT`/
/// `vkSetDebugUtilsObjectTagEXT`. Every shadow object embeds one of these.
///
/// Shadow objects are never copied: they are pinned in place (owned by a device's
/// object map, referenced everywhere else through raw/weak pointers) so that
/// pointers into a `HandleMeta` stay stable for the object's lifetime.
#[derive(Debug, Default)]
pub struct HandleMeta {
    id: ObjectId,
    name: Mutex<String>,
    tags: Mutex<HashMap<u64, Vec<u8>>>,
}

impl HandleMeta {
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            name: Mutex::new(String::new()),
            tags: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock() = name.into();
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_tag(&self, tag: u64, data: Vec<u8>) {
        self.tags.lock().insert(tag, data);
    }

    pub fn get_tag(&self, tag: u64) -> Option<Vec<u8>> {
        self.tags.lock().get(&tag).cloned()
    }
}

/// Implemented by every shadow object type so debug-utils naming/tagging entry
/// points can be written generically instead of once per handle category.
pub trait Nameable {
    fn meta(&self) -> &HandleMeta;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn name_and_tag_roundtrip() {
        let meta = HandleMeta::new();
        assert_eq!(meta.name(), "");
        meta.set_name("my buffer");
        assert_eq!(meta.name(), "my buffer");
        meta.set_tag(42, vec![1, 2, 3]);
        assert_eq!(meta.get_tag(42), Some(vec![1, 2, 3]));
        assert_eq!(meta.get_tag(7), None);
    }
}
