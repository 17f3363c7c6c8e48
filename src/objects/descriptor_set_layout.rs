//! Shadow for `VkDescriptorSetLayout`.
//!
//! Reference-counted: pipelines built from a layout may outlive the
//! application-visible handle (`spec.md` §3). Since the object map stores every
//! shadow behind an `Arc` already, a pipeline keeping its own clone of this
//! `Arc<DescriptorSetLayout>` is sufficient — no separate refcount wrapper needed.

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Debug, Clone)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct DescriptorSetLayout {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::DescriptorSetLayout,
    pub bindings: Vec<DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn new(handle: vk::DescriptorSetLayout, bindings: Vec<DescriptorSetLayoutBinding>) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            bindings,
        }
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    pub fn binding(&self, index: u32) -> Option<&DescriptorSetLayoutBinding> {
        self.bindings.iter().find(|b| b.binding == index)
    }
}

impl Nameable for DescriptorSetLayout {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}

/// Whether binding sets at index `set_index` and beyond with `candidate` is
/// compatible with what was previously laid out by `previous`, up to and
/// including `last_set`. Vulkan's "pipeline layout compatibility" rule: layouts
/// are compatible for set N if every set from 0..=N has an identical descriptor
/// set layout (by content, not handle identity) and identical push constant
/// ranges. This crate compares structurally since recreated layouts with the
/// same content must still compare equal (`spec.md` §4.7 applies the same rule
/// to render-pass descriptions).
pub fn bindings_structurally_equal(a: &DescriptorSetLayout, b: &DescriptorSetLayout) -> bool {
    if a.bindings.len() != b.bindings.len() {
        return false;
    }
    let mut a_sorted = a.bindings.clone();
    let mut b_sorted = b.bindings.clone();
    a_sorted.sort_by_key(|x| x.binding);
    b_sorted.sort_by_key(|x| x.binding);
    a_sorted.iter().zip(b_sorted.iter()).all(|(x, y)| {
        x.binding == y.binding
            && x.descriptor_type == y.descriptor_type
            && x.descriptor_count == y.descriptor_count
            && x.stage_flags == y.stage_flags
    })
}
