//! Shadow for `VkCommandPool`.

use std::sync::{Arc, Weak};

use ash::vk;
use parking_lot::Mutex;

use crate::command::command_buffer::CommandBuffer;
use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandPool {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::CommandPool,
    pub queue_family_index: u32,
    #[derivative(Debug = "ignore")]
    allocated: Mutex<Vec<Weak<CommandBuffer>>>,
}

impl CommandPool {
    pub fn new(handle: vk::CommandPool, queue_family_index: u32) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            queue_family_index,
            allocated: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    pub fn track(&self, cb: &Arc<CommandBuffer>) {
        self.allocated.lock().push(Arc::downgrade(cb));
    }

    /// Every command buffer still alive that was allocated from this pool.
    /// `vkResetCommandPool`/`vkDestroyCommandPool` iterate this to reset/free them.
    pub fn live_command_buffers(&self) -> Vec<Arc<CommandBuffer>> {
        self.allocated.lock().iter().filter_map(Weak::upgrade).collect()
    }
}

impl Nameable for CommandPool {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
