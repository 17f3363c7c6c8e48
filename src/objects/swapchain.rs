//! Shadow for `VkSwapchainKHR`.

use std::sync::Arc;

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};
use crate::objects::image::Image;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Swapchain {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<Arc<Image>>,
}

impl Swapchain {
    pub fn new(handle: vk::SwapchainKHR, format: vk::Format, extent: vk::Extent2D, images: Vec<Arc<Image>>) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            format,
            extent,
            images,
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Whether `image` is one of this swapchain's own images — used by the
    /// matcher's special case for swapchain attachments (`spec.md` §4.7).
    pub fn owns(&self, image: &Arc<Image>) -> bool {
        self.images.iter().any(|i| Arc::ptr_eq(i, image))
    }
}

impl Nameable for Swapchain {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
