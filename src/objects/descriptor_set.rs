//! Shadow for `VkDescriptorSet`.

use std::sync::{Arc, Weak};

use ash::vk;
use parking_lot::Mutex;

use crate::objects::buffer::Buffer;
use crate::objects::buffer_view::BufferView;
use crate::objects::descriptor_set_layout::DescriptorSetLayout;
use crate::objects::handle::{HandleMeta, Nameable};
use crate::objects::image_view::ImageView;
use crate::objects::sampler::Sampler;

/// One binding × array-element slot. A tagged union mirroring Vulkan's
/// `VkWriteDescriptorSet` content kinds (`spec.md` §3).
#[derive(Default)]
pub enum DescriptorSlot {
    #[default]
    Empty,
    ImageSampler {
        sampler: Option<Weak<Sampler>>,
        view: Weak<ImageView>,
        layout: vk::ImageLayout,
    },
    Buffer {
        buffer: Weak<Buffer>,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    BufferView(Weak<BufferView>),
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct DescriptorSet {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::DescriptorSet,
    pub layout: Arc<DescriptorSetLayout>,
    #[derivative(Debug = "ignore")]
    slots: Mutex<Vec<DescriptorSlot>>,
}

impl DescriptorSet {
    pub fn new(handle: vk::DescriptorSet, layout: Arc<DescriptorSetLayout>) -> Self {
        let slot_count: u32 = layout.bindings.iter().map(|b| b.descriptor_count).sum();
        Self {
            meta: HandleMeta::new(),
            handle,
            layout,
            slots: Mutex::new(
                std::iter::repeat_with(DescriptorSlot::default)
                    .take(slot_count as usize)
                    .collect(),
            ),
        }
    }

    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    pub fn write_slot(&self, index: usize, slot: DescriptorSlot) {
        let mut slots = self.slots.lock();
        if index >= slots.len() {
            slots.resize(index + 1, DescriptorSlot::Empty);
        }
        slots[index] = slot;
    }

    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Clone for DescriptorSlot {
    fn clone(&self) -> Self {
        match self {
            DescriptorSlot::Empty => DescriptorSlot::Empty,
            DescriptorSlot::ImageSampler { sampler, view, layout } => DescriptorSlot::ImageSampler {
                sampler: sampler.clone(),
                view: view.clone(),
                layout: *layout,
            },
            DescriptorSlot::Buffer { buffer, offset, range } => DescriptorSlot::Buffer {
                buffer: buffer.clone(),
                offset: *offset,
                range: *range,
            },
            DescriptorSlot::BufferView(v) => DescriptorSlot::BufferView(v.clone()),
        }
    }
}

impl Nameable for DescriptorSet {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
