//! Shadow for `VkPipelineLayout`.
//!
//! Reference-counted for the same reason as [`crate::objects::descriptor_set_layout::DescriptorSetLayout`]:
//! a pipeline built from it keeps it alive past the handle's destruction.

use std::sync::Arc;

use ash::vk;

use crate::objects::descriptor_set_layout::{bindings_structurally_equal, DescriptorSetLayout};
use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Debug, Clone)]
pub struct PushConstantRange {
    pub stage_flags: vk::ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct PipelineLayout {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::PipelineLayout,
    pub set_layouts: Vec<Arc<DescriptorSetLayout>>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineLayout {
    pub fn new(
        handle: vk::PipelineLayout,
        set_layouts: Vec<Arc<DescriptorSetLayout>>,
        push_constant_ranges: Vec<PushConstantRange>,
    ) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            set_layouts,
            push_constant_ranges,
        }
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    /// Whether `self` and `other` are compatible for all sets up to and
    /// including `last_set` — Vulkan's descriptor-set-disturbing compatibility
    /// rule, used both by `CmdBindDescriptorSets` (`spec.md` §4.3) and by
    /// `CmdPushConstants`'s "incompatible layout invalidates the whole map" rule.
    pub fn compatible_up_to(&self, other: &PipelineLayout, last_set: u32) -> bool {
        if self.push_constant_ranges.len() != other.push_constant_ranges.len() {
            return false;
        }
        for (a, b) in self.push_constant_ranges.iter().zip(other.push_constant_ranges.iter()) {
            if a.stage_flags != b.stage_flags || a.offset != b.offset || a.size != b.size {
                return false;
            }
        }
        for set in 0..=last_set {
            let a = self.set_layouts.get(set as usize);
            let b = other.set_layouts.get(set as usize);
            match (a, b) {
                (Some(a), Some(b)) => {
                    if !bindings_structurally_equal(a, b) {
                        return false;
                    }
                }
                (None, None) => {}
                _ => return false,
            }
        }
        true
    }
}

impl Nameable for PipelineLayout {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::descriptor_set_layout::DescriptorSetLayoutBinding;

    fn dsl(bindings: Vec<DescriptorSetLayoutBinding>) -> Arc<DescriptorSetLayout> {
        Arc::new(DescriptorSetLayout::new(
            vk::DescriptorSetLayout::null(),
            bindings,
        ))
    }

    fn binding(i: u32) -> DescriptorSetLayoutBinding {
        DescriptorSetLayoutBinding {
            binding: i,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
        }
    }

    #[test]
    fn identical_layouts_are_compatible() {
        let a = PipelineLayout::new(vk::PipelineLayout::null(), vec![dsl(vec![binding(0)])], vec![]);
        let b = PipelineLayout::new(vk::PipelineLayout::null(), vec![dsl(vec![binding(0)])], vec![]);
        assert!(a.compatible_up_to(&b, 0));
    }

    #[test]
    fn different_binding_types_are_incompatible() {
        let mut other_binding = binding(0);
        other_binding.descriptor_type = vk::DescriptorType::STORAGE_BUFFER;
        let a = PipelineLayout::new(vk::PipelineLayout::null(), vec![dsl(vec![binding(0)])], vec![]);
        let b = PipelineLayout::new(vk::PipelineLayout::null(), vec![dsl(vec![other_binding])], vec![]);
        assert!(!a.compatible_up_to(&b, 0));
    }
}
