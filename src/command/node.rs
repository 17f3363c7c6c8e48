//! The command tree's node types (`spec.md` §3, §4.3): a closed set of tagged
//! variants rather than an open class hierarchy, per the design notes on
//! dynamic dispatch.

use std::sync::Weak;

use ash::vk;

use crate::command::state::{BoundPipeline, IndexBufferBinding, PushConstantShadow, VertexBufferBinding};
use crate::objects::buffer::Buffer;
use crate::objects::image::Image;
use crate::objects::render_pass::RenderPass;

pub type NodeId = u64;

/// A snapshot of the binding state relevant to a draw or dispatch, captured at
/// record time so later rebinds don't retroactively change it (`spec.md` §4.3
/// point 3).
#[derive(Clone, Default)]
pub struct BoundStateSnapshot {
    pub pipeline: Option<BoundPipeline>,
    pub vertex_buffers: Vec<Option<VertexBufferBinding>>,
    pub index_buffer: Option<IndexBufferBinding>,
    pub push_constants: Vec<PushConstantShadow>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    RenderPass,
    DebugLabel,
    ExecuteCommands,
}

/// A section node's label, stored separately since only `DebugLabel` carries
/// one and render passes don't.
#[derive(Clone, Debug, Default)]
pub struct SectionLabel(pub Option<String>);

#[derive(Clone)]
pub struct ImageBarrier {
    pub image: Weak<Image>,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub subresource_range: vk::ImageSubresourceRange,
}

/// The command kinds this layer records. Every variant copies its parameters
/// by value into the record's arena at push time; none retain a pointer back
/// into application memory.
#[derive(Clone)]
pub enum Command {
    BindPipeline(BoundPipeline),
    BindVertexBuffers {
        first_binding: u32,
        bindings: Vec<VertexBufferBinding>,
    },
    BindIndexBuffer(IndexBufferBinding),
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: Weak<crate::objects::pipeline_layout::PipelineLayout>,
        first_set: u32,
        sets: Vec<Weak<crate::objects::descriptor_set::DescriptorSet>>,
    },
    PushConstants {
        stage_flags: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
        state: BoundStateSnapshot,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
        state: BoundStateSnapshot,
    },
    Dispatch {
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
        state: BoundStateSnapshot,
    },
    CopyBuffer {
        src: Weak<Buffer>,
        dst: Weak<Buffer>,
        regions: Vec<vk::BufferCopy>,
    },
    FillBuffer {
        buffer: Weak<Buffer>,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        data: u32,
    },
    UpdateBuffer {
        buffer: Weak<Buffer>,
        offset: vk::DeviceSize,
        data: Vec<u8>,
    },
    PipelineBarrier {
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: Vec<ImageBarrier>,
    },
    /// Marks a `vkCmdNextSubpass` boundary inside an open render-pass section,
    /// the chosen resolution of the open question in `spec.md` §9 on whether
    /// the section boundary is the render pass or the subpass.
    NextSubpass,
    Section {
        kind: SectionKind,
        label: SectionLabel,
        /// Set only for `SectionKind::RenderPass`: the render pass this
        /// section was opened against, so the matcher can compare sections by
        /// structural render-pass identity rather than recording order alone.
        render_pass: Option<Weak<RenderPass>>,
        children: Vec<Node>,
    },
}

#[derive(Clone)]
pub struct Node {
    pub id: NodeId,
    /// Position among siblings of this node's concrete variant, per
    /// `spec.md` §3's `rel_id`.
    pub rel_id: u32,
    pub command: Command,
}
