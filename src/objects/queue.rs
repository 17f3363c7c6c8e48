//! Shadow for `VkQueue`.
//!
//! Queues are dispatchable in the Vulkan ABI, but unlike instances and
//! devices this crate does not register them in `registry::dispatch_table`:
//! a loader is free to hand a queue the same dispatch-key word as the device
//! it was retrieved from, which would silently overwrite that device's own
//! entry in the table's single flat map. Queue shadows instead live in their
//! owning [`crate::objects::device::Device`]'s `queues` `ObjectMap`, keyed by
//! the queue handle's own raw value (`registry::loader` resolves "which
//! device owns this queue" through a loader-local routing table instead).

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Queue {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Queue,
    pub family_index: u32,
    pub index_in_family: u32,
}

impl Queue {
    pub fn new(handle: vk::Queue, family_index: u32, index_in_family: u32) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            family_index,
            index_in_family,
        }
    }

    pub fn handle(&self) -> vk::Queue {
        self.handle
    }
}

impl Nameable for Queue {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
