//! The `used_images`/`used_buffers` tables (`spec.md` §4.4, component D):
//! per-resource entries tracking which command nodes in a record reference it,
//! plus, for images, the layout the record will leave it in.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use ash::vk;

use crate::command::node::NodeId;

pub struct ImageUse {
    pub image: Weak<crate::objects::image::Image>,
    pub referencing_nodes: Vec<NodeId>,
    pub layout_changed: bool,
    pub final_layout: vk::ImageLayout,
    /// Set when the resource is destroyed while still referenced; the record
    /// stays displayable but must not be dereferenced further.
    pub invalidated: bool,
}

pub struct BufferUse {
    pub buffer: Weak<crate::objects::buffer::Buffer>,
    pub referencing_nodes: Vec<NodeId>,
    pub invalidated: bool,
}

#[derive(Default)]
pub struct ResourceUseTable {
    images: HashMap<u64, ImageUse>,
    buffers: HashMap<u64, BufferUse>,
}

fn image_key(image: &Arc<crate::objects::image::Image>) -> u64 {
    use ash::vk::Handle;
    image.handle().as_raw()
}

fn buffer_key(buffer: &Arc<crate::objects::buffer::Buffer>) -> u64 {
    use ash::vk::Handle;
    buffer.handle().as_raw()
}

impl ResourceUseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch_image(&mut self, image: &Arc<crate::objects::image::Image>, node: NodeId) {
        let key = image_key(image);
        let entry = self.images.entry(key).or_insert_with(|| ImageUse {
            image: Arc::downgrade(image),
            referencing_nodes: Vec::new(),
            layout_changed: false,
            final_layout: vk::ImageLayout::UNDEFINED,
            invalidated: false,
        });
        entry.referencing_nodes.push(node);
    }

    /// Records that `node` transitions `image`'s layout to `final_layout`
    /// (barriers, render-pass end, blit/copy destinations with an explicit
    /// layout). Called in addition to [`Self::touch_image`].
    pub fn set_final_layout(&mut self, image: &Arc<crate::objects::image::Image>, final_layout: vk::ImageLayout) {
        let key = image_key(image);
        if let Some(entry) = self.images.get_mut(&key) {
            entry.layout_changed = true;
            entry.final_layout = final_layout;
        }
    }

    pub fn touch_buffer(&mut self, buffer: &Arc<crate::objects::buffer::Buffer>, node: NodeId) {
        let key = buffer_key(buffer);
        let entry = self.buffers.entry(key).or_insert_with(|| BufferUse {
            buffer: Arc::downgrade(buffer),
            referencing_nodes: Vec::new(),
            invalidated: false,
        });
        entry.referencing_nodes.push(node);
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageUse> {
        self.images.values()
    }

    pub fn buffers(&self) -> impl Iterator<Item = &BufferUse> {
        self.buffers.values()
    }

    /// Every `(image, final_layout)` pair this record changed the layout of —
    /// what the submission tracker writes into each image's pending layout at
    /// submit time (`spec.md` §4.5 step 3).
    pub fn layout_changes(&self) -> Vec<(Arc<crate::objects::image::Image>, vk::ImageLayout)> {
        self.images
            .values()
            .filter(|u| u.layout_changed)
            .filter_map(|u| u.image.upgrade().map(|img| (img, u.final_layout)))
            .collect()
    }

    /// Marks every entry referencing `image` invalid — called when the
    /// resource is destroyed while a record still references it.
    pub fn invalidate_image(&mut self, image: &Arc<crate::objects::image::Image>) {
        let key = image_key(image);
        if let Some(entry) = self.images.get_mut(&key) {
            entry.invalidated = true;
        }
    }

    pub fn invalidate_buffer(&mut self, buffer: &Arc<crate::objects::buffer::Buffer>) {
        let key = buffer_key(buffer);
        if let Some(entry) = self.buffers.get_mut(&key) {
            entry.invalidated = true;
        }
    }

    /// `ExecuteCommands` merges a secondary record's tables into the
    /// primary's, so destruction of a resource used only by a secondary still
    /// invalidates the primary (`spec.md` §4.4).
    pub fn merge(&mut self, other: &ResourceUseTable) {
        for (key, other_use) in &other.images {
            let entry = self.images.entry(*key).or_insert_with(|| ImageUse {
                image: other_use.image.clone(),
                referencing_nodes: Vec::new(),
                layout_changed: false,
                final_layout: vk::ImageLayout::UNDEFINED,
                invalidated: false,
            });
            entry.referencing_nodes.extend(other_use.referencing_nodes.iter().copied());
            if other_use.layout_changed {
                entry.layout_changed = true;
                entry.final_layout = other_use.final_layout;
            }
            entry.invalidated |= other_use.invalidated;
        }
        for (key, other_use) in &other.buffers {
            let entry = self.buffers.entry(*key).or_insert_with(|| BufferUse {
                buffer: other_use.buffer.clone(),
                referencing_nodes: Vec::new(),
                invalidated: false,
            });
            entry.referencing_nodes.extend(other_use.referencing_nodes.iter().copied());
            entry.invalidated |= other_use.invalidated;
        }
    }
}
