//! Shadow for `VkBuffer`.

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Debug, Clone)]
pub struct BufferCreateInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub sharing_mode: vk::SharingMode,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Buffer {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Buffer,
    pub info: BufferCreateInfo,
}

impl Buffer {
    pub fn new(handle: vk::Buffer, info: BufferCreateInfo) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            info,
        }
    }

    #[cfg(test)]
    pub fn new_for_test(size: vk::DeviceSize) -> Self {
        Self::new(
            vk::Buffer::null(),
            BufferCreateInfo {
                size,
                usage: vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
            },
        )
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }
}

impl Nameable for Buffer {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
