//! Shadow for `VkCommandBuffer` and the four-state recording state machine
//! (`spec.md` §4.3, §5): initial → recording → executable → pending → (retire)
//! → executable → (reset) → initial.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ash::vk;
use parking_lot::Mutex;

use crate::command::node::{Command, ImageBarrier, SectionKind, SectionLabel};
use crate::command::record::CommandRecord;
use crate::command::state::{BoundPipeline, IndexBufferBinding, VertexBufferBinding};
use crate::config::LayerConfig;
use crate::error::{Error, Result};
use crate::objects::buffer::Buffer;
use crate::objects::command_pool::CommandPool;
use crate::objects::descriptor_set::DescriptorSet;
use crate::objects::handle::{HandleMeta, Nameable};
use crate::objects::image::Image;
use crate::objects::pipeline::{ComputePipeline, GraphicsPipeline};
use crate::objects::pipeline_layout::PipelineLayout;
use crate::objects::render_pass::RenderPass;
use crate::submission::tracker::PendingSubmission;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbState {
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandBuffer {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::CommandBuffer,
    #[derivative(Debug = "ignore")]
    pool: Weak<CommandPool>,
    pub primary: bool,
    state: Mutex<CbState>,
    #[derivative(Debug = "ignore")]
    record: Mutex<Arc<Mutex<CommandRecord>>>,
    reset_count: AtomicU64,
    #[derivative(Debug = "ignore")]
    pending: Mutex<Vec<Weak<PendingSubmission>>>,
}

impl CommandBuffer {
    pub fn new(handle: vk::CommandBuffer, pool: Weak<CommandPool>, primary: bool) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            pool,
            primary,
            state: Mutex::new(CbState::Initial),
            record: Mutex::new(Arc::new(Mutex::new(CommandRecord::new(0)))),
            reset_count: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn pool(&self) -> Option<Arc<CommandPool>> {
        self.pool.upgrade()
    }

    pub fn state(&self) -> CbState {
        *self.state.lock()
    }

    pub fn reset_count(&self) -> u64 {
        self.reset_count.load(Ordering::Relaxed)
    }

    /// The current record, reference-counted so a GUI selection or pending
    /// submission can keep a record alive after the command buffer moves on
    /// to a new one (`spec.md` §3).
    pub fn record(&self) -> Arc<Mutex<CommandRecord>> {
        self.record.lock().clone()
    }

    /// `vkBeginCommandBuffer`: rebuilds the record from scratch (`spec.md` §4.3).
    pub fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == CbState::Pending {
            return Err(Error::InvariantViolation("Begin called on a pending command buffer").into());
        }
        let count = self.reset_count.fetch_add(1, Ordering::SeqCst) + 1;
        *self.record.lock() = Arc::new(Mutex::new(CommandRecord::new(count)));
        *state = CbState::Recording;
        Ok(())
    }

    /// `vkEndCommandBuffer`: closes any still-open label sections implicitly.
    pub fn end(&self, cfg: &LayerConfig) -> Result<()> {
        let mut state = self.state.lock();
        if *state != CbState::Recording {
            return Err(Error::InvariantViolation("End called outside recording state").into());
        }
        self.record.lock().lock().finish(cfg);
        *state = CbState::Executable;
        Ok(())
    }

    /// `vkResetCommandBuffer`/implicit reset via `vkBeginCommandBuffer` on an
    /// executable buffer: returns to `initial`, bumping `reset_count`.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == CbState::Pending {
            return Err(Error::InvariantViolation("Reset called on a pending command buffer").into());
        }
        let count = self.reset_count.fetch_add(1, Ordering::SeqCst) + 1;
        *self.record.lock() = Arc::new(Mutex::new(CommandRecord::new(count)));
        *state = CbState::Initial;
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        *self.state.lock() == CbState::Pending
    }

    /// Called by the submission tracker at submit time: transitions to
    /// `pending` and records the back-pointer (`spec.md` §4.5 step 3).
    pub fn push_pending(&self, submission: Weak<PendingSubmission>) {
        *self.state.lock() = CbState::Pending;
        self.pending.lock().push(submission);
    }

    /// Called by the submission tracker at retirement: drops the back-pointer
    /// and, if no other submission still references this buffer, returns it
    /// to `executable`.
    pub fn remove_pending(&self, submission: &Arc<PendingSubmission>) {
        let mut pending = self.pending.lock();
        pending.retain(|w| w.upgrade().is_some_and(|s| !Arc::ptr_eq(&s, submission)));
        if pending.is_empty() {
            drop(pending);
            let mut state = self.state.lock();
            if *state == CbState::Pending {
                *state = CbState::Executable;
            }
        }
    }

    /// Every `(image, final_layout)` pair this buffer's finished record
    /// changed the layout of.
    pub fn layout_changes(&self) -> Vec<(Arc<Image>, vk::ImageLayout)> {
        self.record.lock().lock().used_images.layout_changes()
    }

    fn ensure_recording(&self) -> Result<()> {
        if *self.state.lock() != CbState::Recording {
            return Err(Error::InvariantViolation("vkCmd* called outside recording state").into());
        }
        Ok(())
    }

    pub fn cmd_bind_pipeline(&self, pipeline: BoundPipeline) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        record.state.pipeline = Some(pipeline.clone());
        record.push_node(Command::BindPipeline(pipeline));
        Ok(())
    }

    pub fn cmd_bind_vertex_buffers(&self, first_binding: u32, bindings: Vec<VertexBufferBinding>) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        for (i, b) in bindings.iter().enumerate() {
            if let Some(buf) = b.buffer.upgrade() {
                let last = record.nodes().len() as u64;
                record.used_buffers.touch_buffer(&buf, last + i as u64);
            }
        }
        let slot = (first_binding as usize) + bindings.len();
        if record.state.vertex_buffers.len() < slot {
            record.state.vertex_buffers.resize(slot, None);
        }
        for (i, b) in bindings.iter().cloned().enumerate() {
            record.state.vertex_buffers[first_binding as usize + i] = Some(b);
        }
        record.push_node(Command::BindVertexBuffers { first_binding, bindings });
        Ok(())
    }

    pub fn cmd_bind_index_buffer(&self, binding: IndexBufferBinding) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        if let Some(buf) = binding.buffer.upgrade() {
            let node = record.push_node(Command::BindIndexBuffer(binding.clone()));
            record.used_buffers.touch_buffer(&buf, node);
        } else {
            record.push_node(Command::BindIndexBuffer(binding.clone()));
        }
        record.state.index_buffer = Some(binding);
        Ok(())
    }

    /// `CmdBindDescriptorSets`: applies the descriptor-disturbing rule and
    /// invalidates push constants when the layout is incompatible
    /// (`spec.md` §4.3).
    pub fn cmd_bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: &Arc<PipelineLayout>,
        first_set: u32,
        sets: &[Arc<DescriptorSet>],
    ) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();

        let incompatible_with_current = record
            .state
            .pipeline
            .as_ref()
            .map(|p| !p.layout().compatible_up_to(layout, first_set.saturating_sub(1)))
            .unwrap_or(false);
        if incompatible_with_current {
            record.state.invalidate_push_constants();
        }

        record.state.bind_descriptor_sets(layout, first_set, sets);
        record.push_node(Command::BindDescriptorSets {
            bind_point,
            layout: Arc::downgrade(layout),
            first_set,
            sets: sets.iter().map(Arc::downgrade).collect(),
        });
        Ok(())
    }

    /// `CmdPushConstants`: merges into the per-stage shadow (`spec.md` §4.3,
    /// testable property 3).
    pub fn cmd_push_constants(&self, stage_flags: vk::ShaderStageFlags, offset: u32, data: &[u8]) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        record.state.push_constants_mut(stage_flags).merge(offset, data);
        record.push_node(Command::PushConstants {
            stage_flags,
            offset,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn snapshot_state(record: &CommandRecord, layout: &Arc<PipelineLayout>) -> crate::command::node::BoundStateSnapshot {
        let relevant_push_constants = record
            .state
            .push_constants
            .iter()
            .filter(|p| layout.push_constant_ranges.iter().any(|r| r.stage_flags.intersects(p.stage_flags)))
            .cloned()
            .collect();
        crate::command::node::BoundStateSnapshot {
            pipeline: record.state.pipeline.clone(),
            vertex_buffers: record.state.vertex_buffers.clone(),
            index_buffer: record.state.index_buffer.clone(),
            push_constants: relevant_push_constants,
        }
    }

    pub fn cmd_draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        let layout = record
            .state
            .pipeline
            .as_ref()
            .map(|p| p.layout().clone())
            .ok_or_else(|| Error::InvariantViolation("Draw called with no bound pipeline"))?;
        let state = Self::snapshot_state(&record, &layout);
        record.push_node(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
            state,
        });
        Ok(())
    }

    pub fn cmd_draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        let layout = record
            .state
            .pipeline
            .as_ref()
            .map(|p| p.layout().clone())
            .ok_or_else(|| Error::InvariantViolation("DrawIndexed called with no bound pipeline"))?;
        let state = Self::snapshot_state(&record, &layout);
        record.push_node(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
            state,
        });
        Ok(())
    }

    pub fn cmd_dispatch(&self, x: u32, y: u32, z: u32) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        let layout = record
            .state
            .pipeline
            .as_ref()
            .map(|p| p.layout().clone())
            .ok_or_else(|| Error::InvariantViolation("Dispatch called with no bound pipeline"))?;
        let state = Self::snapshot_state(&record, &layout);
        record.push_node(Command::Dispatch {
            group_count_x: x,
            group_count_y: y,
            group_count_z: z,
            state,
        });
        Ok(())
    }

    pub fn cmd_copy_buffer(&self, src: &Arc<Buffer>, dst: &Arc<Buffer>, regions: Vec<vk::BufferCopy>) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        let node = record.push_node(Command::CopyBuffer {
            src: Arc::downgrade(src),
            dst: Arc::downgrade(dst),
            regions,
        });
        record.used_buffers.touch_buffer(src, node);
        record.used_buffers.touch_buffer(dst, node);
        Ok(())
    }

    pub fn cmd_fill_buffer(&self, buffer: &Arc<Buffer>, offset: vk::DeviceSize, size: vk::DeviceSize, data: u32) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        let node = record.push_node(Command::FillBuffer {
            buffer: Arc::downgrade(buffer),
            offset,
            size,
            data,
        });
        record.used_buffers.touch_buffer(buffer, node);
        Ok(())
    }

    pub fn cmd_update_buffer(&self, buffer: &Arc<Buffer>, offset: vk::DeviceSize, data: Vec<u8>) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        let node = record.push_node(Command::UpdateBuffer {
            buffer: Arc::downgrade(buffer),
            offset,
            data,
        });
        record.used_buffers.touch_buffer(buffer, node);
        Ok(())
    }

    /// `CmdPipelineBarrier`: registers affected images and records each
    /// barrier's target layout as the image's new expected final layout
    /// (`spec.md` §4.4).
    pub fn cmd_pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: Vec<(Arc<Image>, ImageBarrier)>,
    ) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        let barriers: Vec<ImageBarrier> = image_barriers.iter().map(|(_, b)| b.clone()).collect();
        let node = record.push_node(Command::PipelineBarrier {
            src_stage,
            dst_stage,
            image_barriers: barriers,
        });
        for (image, barrier) in &image_barriers {
            record.used_images.touch_image(image, node);
            record.used_images.set_final_layout(image, barrier.new_layout);
        }
        Ok(())
    }

    pub fn cmd_begin_render_pass(&self, render_pass: &Arc<RenderPass>) -> Result<()> {
        self.ensure_recording()?;
        self.record()
            .lock()
            .open_section(SectionKind::RenderPass, SectionLabel(None), Some(Arc::downgrade(render_pass)));
        Ok(())
    }

    pub fn cmd_next_subpass(&self) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        if record.in_render_pass() {
            record.push_node(Command::NextSubpass);
        }
        Ok(())
    }

    pub fn cmd_end_render_pass(&self) -> Result<()> {
        self.ensure_recording()?;
        self.record().lock().close_section(SectionKind::RenderPass);
        Ok(())
    }

    pub fn cmd_begin_debug_label(&self, label: String) -> Result<()> {
        self.ensure_recording()?;
        self.record()
            .lock()
            .open_section(SectionKind::DebugLabel, SectionLabel(Some(label)), None);
        Ok(())
    }

    pub fn cmd_end_debug_label(&self) -> Result<()> {
        self.ensure_recording()?;
        self.record().lock().close_section(SectionKind::DebugLabel);
        Ok(())
    }

    /// `CmdExecuteCommands`: opens and immediately closes an `ExecuteCommands`
    /// section whose children are a copy of each secondary's tree, and merges
    /// each secondary's resource-use tables into this (primary) record's
    /// (`spec.md` §4.4).
    pub fn cmd_execute_commands(&self, secondaries: &[Arc<CommandBuffer>]) -> Result<()> {
        self.ensure_recording()?;
        let record = self.record();
        let mut record = record.lock();
        record.open_section(SectionKind::ExecuteCommands, SectionLabel(None), None);
        for secondary in secondaries {
            let secondary_record = secondary.record();
            let secondary_record = secondary_record.lock();
            for node in secondary_record.nodes() {
                record.push_node(node.command.clone());
            }
            record.used_images.merge(&secondary_record.used_images);
            record.used_buffers.merge(&secondary_record.used_buffers);
        }
        record.close_section(SectionKind::ExecuteCommands);
        Ok(())
    }
}

impl Nameable for CommandBuffer {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_cb() -> Arc<CommandBuffer> {
        let pool = Arc::new(CommandPool::new(vk::CommandPool::null(), 0));
        Arc::new(CommandBuffer::new(vk::CommandBuffer::null(), Arc::downgrade(&pool), true))
    }

    #[test]
    fn state_machine_initial_recording_executable() {
        let cb = new_cb();
        assert_eq!(cb.state(), CbState::Initial);
        cb.begin().unwrap();
        assert_eq!(cb.state(), CbState::Recording);
        cb.end(&LayerConfig::default()).unwrap();
        assert_eq!(cb.state(), CbState::Executable);
    }

    #[test]
    fn reset_bumps_counter_and_clears_record() {
        let cb = new_cb();
        cb.begin().unwrap();
        cb.cmd_fill_buffer(&Arc::new(Buffer::new_for_test(16)), 0, 16, 0).unwrap();
        cb.end(&LayerConfig::default()).unwrap();
        let count_before = cb.reset_count();
        cb.reset().unwrap();
        assert_eq!(cb.state(), CbState::Initial);
        assert_eq!(cb.reset_count(), count_before + 1);
        assert_eq!(cb.record().lock().nodes().len(), 0);
    }

    #[test]
    fn scenario_e2_record_three_nodes_in_order() {
        let cb = new_cb();
        let buf = Arc::new(Buffer::new_for_test(128));
        cb.begin().unwrap();
        cb.cmd_fill_buffer(&buf, 0, 32, 0xC0DE00FF).unwrap();
        cb.cmd_copy_buffer(
            &buf,
            &buf,
            vec![vk::BufferCopy {
                src_offset: 0,
                dst_offset: 32,
                size: 32,
            }],
        )
        .unwrap();
        cb.cmd_update_buffer(&buf, 64, vec![0u8; 128]).unwrap();
        cb.end(&LayerConfig::default()).unwrap();

        let record = cb.record();
        let record = record.lock();
        let nodes = record.nodes();
        assert_eq!(nodes.len(), 3);
        assert!(matches!(nodes[0].command, Command::FillBuffer { .. }));
        assert!(matches!(nodes[1].command, Command::CopyBuffer { .. }));
        assert!(matches!(nodes[2].command, Command::UpdateBuffer { .. }));
    }
}
