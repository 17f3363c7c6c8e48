//! Shadows for `VkPipeline` objects, split into the graphics and compute shapes
//! the application creates them as.

use std::sync::Arc;

use ash::vk;

use crate::objects::handle::{HandleMeta, Nameable};
use crate::objects::pipeline_layout::PipelineLayout;
use crate::objects::render_pass::RenderPassDescription;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct GraphicsPipeline {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
    /// Kept alive independent of the render-pass handle, per `spec.md` §3.
    pub render_pass: Arc<RenderPassDescription>,
    pub subpass: u32,
}

impl GraphicsPipeline {
    pub fn new(
        handle: vk::Pipeline,
        layout: Arc<PipelineLayout>,
        render_pass: Arc<RenderPassDescription>,
        subpass: u32,
    ) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            layout,
            render_pass,
            subpass,
        }
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

impl Nameable for GraphicsPipeline {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct ComputePipeline {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
}

impl ComputePipeline {
    pub fn new(handle: vk::Pipeline, layout: Arc<PipelineLayout>) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            layout,
        }
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

impl Nameable for ComputePipeline {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
