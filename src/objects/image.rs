//! Shadow for `VkImage`.

use ash::vk;
use parking_lot::Mutex;

use crate::objects::handle::{HandleMeta, Nameable};

/// Copy of the subset of `VkImageCreateInfo` the layer needs for introspection.
#[derive(Debug, Clone)]
pub struct ImageCreateInfo {
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub initial_layout: vk::ImageLayout,
}

/// Shadow object for a `VkImage`.
///
/// Tracks the layout the image *will* have once every currently pending
/// submission that touches it has completed (`pending_layout`), distinct from
/// whatever layout it has on the GPU right now (`spec.md` §3, §4.6).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Image {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Image,
    pub info: ImageCreateInfo,
    /// True for swapchain images: owned by the presentation engine, not
    /// destroyed by the layer's `vkDestroyImage` bookkeeping.
    pub swapchain_owned: bool,
    pending_layout: Mutex<vk::ImageLayout>,
}

impl Image {
    pub fn new(handle: vk::Image, info: ImageCreateInfo, swapchain_owned: bool) -> Self {
        let initial = info.initial_layout;
        Self {
            meta: HandleMeta::new(),
            handle,
            info,
            swapchain_owned,
            pending_layout: Mutex::new(initial),
        }
    }

    #[cfg(test)]
    pub fn new_for_test(size: vk::DeviceSize) -> Self {
        Self::new(
            vk::Image::null(),
            ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format: vk::Format::R8G8B8A8_UNORM,
                extent: vk::Extent3D {
                    width: size as u32,
                    height: 1,
                    depth: 1,
                },
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                usage: vk::ImageUsageFlags::empty(),
                initial_layout: vk::ImageLayout::UNDEFINED,
            },
            false,
        )
    }

    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn pending_layout(&self) -> vk::ImageLayout {
        *self.pending_layout.lock()
    }

    /// Called by the submission tracker (component E) at submit time, once per
    /// image whose record marked it `layout_changed` (component F).
    pub fn set_pending_layout(&self, layout: vk::ImageLayout) {
        *self.pending_layout.lock() = layout;
    }
}

impl Nameable for Image {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
