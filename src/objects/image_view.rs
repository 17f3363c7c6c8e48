//! Shadow for `VkImageView`.

use std::sync::{Arc, Weak};

use ash::vk;
use parking_lot::Mutex;

use crate::config::LayerConfig;
use crate::layer_warn;
use crate::objects::framebuffer::Framebuffer;
use crate::objects::handle::{HandleMeta, Nameable};
use crate::objects::image::Image;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct ImageView {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::ImageView,
    pub image: Weak<Image>,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
    /// Framebuffers that reference this view. Destroying the view while this is
    /// non-empty is invalid per Vulkan and is enforced by a debug assertion
    /// (`spec.md` §3).
    #[derivative(Debug = "ignore")]
    referencing_framebuffers: Mutex<Vec<Weak<Framebuffer>>>,
}

impl ImageView {
    pub fn new(
        handle: vk::ImageView,
        image: Weak<Image>,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        base_mip_level: u32,
        level_count: u32,
        base_array_layer: u32,
        layer_count: u32,
    ) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            image,
            format,
            aspect,
            base_mip_level,
            level_count,
            base_array_layer,
            layer_count,
            referencing_framebuffers: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    pub fn add_framebuffer_ref(&self, fb: &Arc<Framebuffer>) {
        self.referencing_framebuffers.lock().push(Arc::downgrade(fb));
    }

    pub fn remove_framebuffer_ref(&self, fb: &Arc<Framebuffer>) {
        self.referencing_framebuffers
            .lock()
            .retain(|w| match w.upgrade() {
                Some(f) => !Arc::ptr_eq(&f, fb),
                None => false,
            });
    }

    /// Live framebuffers still referencing this view. Non-empty means destroying
    /// the view right now is invalid.
    pub fn live_referencing_framebuffers(&self) -> Vec<Arc<Framebuffer>> {
        self.referencing_framebuffers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Assert that no framebuffer still references this view before it is
    /// destroyed. Tolerated as a logged (and optionally trapped) invariant
    /// violation rather than a hard panic, per `spec.md` §7.
    pub fn assert_destroyable(&self, cfg: &LayerConfig) {
        let live = self.live_referencing_framebuffers();
        if !live.is_empty() {
            layer_warn!(
                cfg,
                "destroying VkImageView still referenced by {} live framebuffer(s)",
                live.len()
            );
        }
    }
}

impl Nameable for ImageView {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::framebuffer::FramebufferCreateInfo;

    fn view() -> ImageView {
        ImageView::new(
            vk::ImageView::null(),
            Weak::new(),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageAspectFlags::COLOR,
            0,
            1,
            0,
            1,
        )
    }

    #[test]
    fn destroy_with_no_framebuffers_is_fine() {
        let view = view();
        assert!(view.live_referencing_framebuffers().is_empty());
    }

    #[test]
    fn framebuffer_reference_tracked_until_removed() {
        let view = Arc::new(view());
        let fb = Arc::new(Framebuffer::new(
            vk::Framebuffer::null(),
            FramebufferCreateInfo {
                attachments: vec![],
                width: 1,
                height: 1,
                layers: 1,
            },
        ));
        view.add_framebuffer_ref(&fb);
        assert_eq!(view.live_referencing_framebuffers().len(), 1);
        view.remove_framebuffer_ref(&fb);
        assert!(view.live_referencing_framebuffers().is_empty());
    }
}
