//! Shadow for `VkInstance`.

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};
use crate::registry::dispatch_table;

/// Shadow object for a `VkInstance`. Owns nothing but its own identity; physical
/// devices and debug messengers are looked up separately.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Instance {
    meta: HandleMeta,
    /// The dispatch key the loader wrote into this handle's first machine word.
    /// Used to register/unregister this shadow in the process-wide dispatch table.
    dispatch_key: u64,
    #[derivative(Debug = "ignore")]
    handle: vk::Instance,
    api_version: u32,
}

impl Instance {
    /// Build the shadow for a freshly created instance and register it in the
    /// process-wide dispatch table under its dispatch key (`spec.md` §4.1).
    pub fn register(handle: vk::Instance, dispatch_key: u64, api_version: u32) -> std::sync::Arc<Self> {
        let instance = std::sync::Arc::new(Self {
            meta: HandleMeta::new(),
            dispatch_key,
            handle,
            api_version,
        });
        dispatch_table().insert(dispatch_key, instance.clone());
        instance
    }

    pub fn handle(&self) -> vk::Instance {
        self.handle
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Remove this instance from the dispatch table. Must be called from
    /// `vkDestroyInstance` after the last device on it has been destroyed.
    pub fn unregister(&self) {
        dispatch_table().remove(self.dispatch_key);
    }
}

impl Nameable for Instance {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
