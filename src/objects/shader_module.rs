//! Shadow for `VkShaderModule`.
//!
//! SPIR-V reflection is delegated to an external collaborator (`spec.md` §6);
//! this shadow only stores whatever the reflector hands back.

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};

/// Opaque reflection data produced by the external SPIR-V reflector. The core
/// never parses SPIR-V itself; it just stores and forwards this.
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    pub entry_point: String,
    pub stage: vk::ShaderStageFlags,
    pub inferred_set_layouts: Vec<Vec<(u32, vk::DescriptorType)>>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct ShaderModule {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::ShaderModule,
    pub code_size: usize,
    pub reflection: Option<ShaderReflection>,
}

impl ShaderModule {
    pub fn new(handle: vk::ShaderModule, code_size: usize, reflection: Option<ShaderReflection>) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            code_size,
            reflection,
        }
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}

impl Nameable for ShaderModule {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
