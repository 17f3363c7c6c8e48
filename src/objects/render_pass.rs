//! Shadow for `VkRenderPass`.
//!
//! The full description lives in a shared-ownership wrapper
//! ([`RenderPassDescription`]) separate from the handle shadow, so framebuffers
//! and pipelines created against this render pass keep the description alive
//! after the handle itself is destroyed — Vulkan's render-pass compatibility
//! rules require comparing descriptions, not live handles (`spec.md` §3).

use std::sync::Arc;

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Debug, Clone)]
pub struct AttachmentDescription {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

/// A subpass's usage of the render pass's attachments, referenced by attachment
/// index. `vk::ATTACHMENT_UNUSED` (`!0`) marks an absent reference.
#[derive(Debug, Clone, Default)]
pub struct SubpassDescription {
    pub input_attachments: Vec<u32>,
    pub color_attachments: Vec<u32>,
    pub resolve_attachments: Vec<u32>,
    pub depth_stencil_attachment: Option<u32>,
}

/// The structural description of a render pass: attachments and subpasses,
/// compared by content (not handle identity) when checking render-pass
/// compatibility across recreation (`spec.md` §4.7).
#[derive(Debug, Clone)]
pub struct RenderPassDescription {
    pub attachments: Vec<AttachmentDescription>,
    pub subpasses: Vec<SubpassDescription>,
}

impl PartialEq for RenderPassDescription {
    fn eq(&self, other: &Self) -> bool {
        if self.attachments.len() != other.attachments.len() || self.subpasses.len() != other.subpasses.len() {
            return false;
        }
        self.attachments.iter().zip(other.attachments.iter()).all(|(a, b)| {
            a.format == b.format && a.samples == b.samples && a.load_op == b.load_op && a.store_op == b.store_op
        }) && self.subpasses.iter().zip(other.subpasses.iter()).all(|(a, b)| {
            a.input_attachments == b.input_attachments
                && a.color_attachments == b.color_attachments
                && a.resolve_attachments == b.resolve_attachments
                && a.depth_stencil_attachment == b.depth_stencil_attachment
        })
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderPass {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::RenderPass,
    pub description: Arc<RenderPassDescription>,
}

impl RenderPass {
    pub fn new(handle: vk::RenderPass, description: RenderPassDescription) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            description: Arc::new(description),
        }
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }
}

impl Nameable for RenderPass {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
