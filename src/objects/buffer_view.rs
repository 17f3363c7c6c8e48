//! Shadow for `VkBufferView`.

use std::sync::Weak;

use ash::vk;

use crate::objects::buffer::Buffer;
use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct BufferView {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::BufferView,
    pub buffer: Weak<Buffer>,
    pub format: vk::Format,
    pub offset: vk::DeviceSize,
    pub range: vk::DeviceSize,
}

impl BufferView {
    pub fn new(
        handle: vk::BufferView,
        buffer: Weak<Buffer>,
        format: vk::Format,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            buffer,
            format,
            offset,
            range,
        }
    }

    pub fn handle(&self) -> vk::BufferView {
        self.handle
    }
}

impl Nameable for BufferView {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
