//! Shadow for `VkFramebuffer`.

use std::sync::Arc;

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};
use crate::objects::image_view::ImageView;

#[derive(Debug, Clone)]
pub struct FramebufferCreateInfo {
    pub attachments: Vec<Arc<ImageView>>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Framebuffer {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Framebuffer,
    pub info: FramebufferCreateInfo,
}

impl Framebuffer {
    pub fn new(handle: vk::Framebuffer, info: FramebufferCreateInfo) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            info,
        }
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    /// Register this framebuffer on each of its attachments' back-reference
    /// lists. Must be called right after the framebuffer is inserted into the
    /// device's object map, so the `Arc<Framebuffer>` passed in is the same one
    /// stored there.
    pub fn register_attachment_refs(self: &Arc<Self>) {
        for view in &self.info.attachments {
            view.add_framebuffer_ref(self);
        }
    }

    pub fn unregister_attachment_refs(self: &Arc<Self>) {
        for view in &self.info.attachments {
            view.remove_framebuffer_ref(self);
        }
    }
}

impl Nameable for Framebuffer {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
