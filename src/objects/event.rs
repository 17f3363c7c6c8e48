//! Shadow for `VkEvent`.

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Event {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Event,
}

impl Event {
    pub fn new(handle: vk::Event) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
        }
    }

    pub fn handle(&self) -> vk::Event {
        self.handle
    }
}

impl Nameable for Event {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
