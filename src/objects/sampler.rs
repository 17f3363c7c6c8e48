//! Shadow for `VkSampler`.

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Debug, Clone)]
pub struct SamplerCreateInfo {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Sampler {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Sampler,
    pub info: SamplerCreateInfo,
}

impl Sampler {
    pub fn new(handle: vk::Sampler, info: SamplerCreateInfo) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            info,
        }
    }

    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}

impl Nameable for Sampler {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
