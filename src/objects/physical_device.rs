//! Shadow for `VkPhysicalDevice`.
//!
//! Physical devices are dispatchable but the layer never creates or destroys
//! them — they are enumerated from the instance and live as long as it does. The
//! shadow here just carries the properties the rest of the layer wants without
//! re-querying the driver on every access.

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};
use crate::registry::dispatch_table;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct PhysicalDevice {
    meta: HandleMeta,
    dispatch_key: u64,
    #[derivative(Debug = "ignore")]
    handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl PhysicalDevice {
    pub fn register(
        handle: vk::PhysicalDevice,
        dispatch_key: u64,
        properties: vk::PhysicalDeviceProperties,
        queue_families: Vec<vk::QueueFamilyProperties>,
    ) -> std::sync::Arc<Self> {
        let pd = std::sync::Arc::new(Self {
            meta: HandleMeta::new(),
            dispatch_key,
            handle,
            properties,
            queue_families,
        });
        dispatch_table().insert(dispatch_key, pd.clone());
        pd
    }

    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }
}

impl Nameable for PhysicalDevice {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
