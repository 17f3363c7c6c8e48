//! Captured per-binding state carried forward as commands are recorded
//! (`spec.md` §4.3): bound pipeline, vertex/index buffers, descriptor sets,
//! and the push-constant shadow.

use std::sync::{Arc, Weak};

use ash::vk;

use crate::objects::buffer::Buffer;
use crate::objects::descriptor_set::DescriptorSet;
use crate::objects::pipeline::{ComputePipeline, GraphicsPipeline};
use crate::objects::pipeline_layout::PipelineLayout;

#[derive(Clone)]
pub enum BoundPipeline {
    Graphics(Arc<GraphicsPipeline>),
    Compute(Arc<ComputePipeline>),
}

impl BoundPipeline {
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        match self {
            BoundPipeline::Graphics(p) => &p.layout,
            BoundPipeline::Compute(p) => &p.layout,
        }
    }
}

#[derive(Clone)]
pub struct VertexBufferBinding {
    pub buffer: Weak<Buffer>,
    pub offset: vk::DeviceSize,
}

#[derive(Clone)]
pub struct IndexBufferBinding {
    pub buffer: Weak<Buffer>,
    pub offset: vk::DeviceSize,
    pub index_type: vk::IndexType,
}

/// One contiguous run of shadow bytes at `offset`. Ranges in a
/// [`PushConstantShadow`] never overlap and never touch — [`PushConstantShadow::merge`]
/// keeps that invariant by absorbing any overlapping or adjacent range on write.
#[derive(Clone)]
pub struct ByteRange {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

impl ByteRange {
    pub fn end(&self) -> u32 {
        self.offset + self.bytes.len() as u32
    }
}

/// Shadow of push-constant bytes for one shader-stage mask, as tracked by
/// `CmdPushConstants` (`spec.md` §4.3, testable property 3).
#[derive(Clone, Default)]
pub struct PushConstantShadow {
    pub stage_flags: vk::ShaderStageFlags,
    pub ranges: Vec<ByteRange>,
}

impl PushConstantShadow {
    /// Merges `data` at `offset` into the live ranges. Two adjacent
    /// non-overlapping ranges merge into one; where ranges overlap, the
    /// later write's bytes win. Applying the same call twice is idempotent.
    ///
    /// This folds every overlapping-or-touching old range into a single new
    /// one in a single pass, unlike an approach that merges pairwise while
    /// advancing an iterator — which silently drops or misorders a third
    /// adjacent range when folding three or more at once.
    pub fn merge(&mut self, offset: u32, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let new_start = offset;
        let new_end = offset + data.len() as u32;
        let mut start = new_start;
        let mut end = new_end;
        let mut absorbed = Vec::new();
        self.ranges.retain(|r| {
            if r.end() < new_start || r.offset > new_end {
                true
            } else {
                start = start.min(r.offset);
                end = end.max(r.end());
                absorbed.push(r.clone());
                false
            }
        });
        let mut merged = vec![0u8; (end - start) as usize];
        for r in &absorbed {
            let rel = (r.offset - start) as usize;
            merged[rel..rel + r.bytes.len()].copy_from_slice(&r.bytes);
        }
        let rel = (new_start - start) as usize;
        merged[rel..rel + data.len()].copy_from_slice(data);
        self.ranges.push(ByteRange { offset: start, bytes: merged });
        self.ranges.sort_by(|a, b| a.offset.cmp(&b.offset));
    }
}

/// A descriptor set slot together with the pipeline layout it was bound
/// with — needed to re-evaluate compatibility the next time a later
/// `CmdBindDescriptorSets` call may disturb it.
#[derive(Clone)]
pub struct DescriptorSlotBinding {
    pub set: Weak<DescriptorSet>,
    pub bound_with_layout: Arc<PipelineLayout>,
}

/// Full captured binding state at a point in recording. Draw/dispatch nodes
/// clone the parts relevant to their bound pipeline layout into their node so
/// later rebinds don't retroactively change an already-recorded snapshot.
#[derive(Clone, Default)]
pub struct BoundState {
    pub pipeline: Option<BoundPipeline>,
    pub vertex_buffers: Vec<Option<VertexBufferBinding>>,
    pub index_buffer: Option<IndexBufferBinding>,
    pub descriptor_sets: Vec<Option<DescriptorSlotBinding>>,
    /// One shadow per distinct stage mask ever pushed to, matching the
    /// spec's "map from shader stage to (bytes, live ranges)".
    pub push_constants: Vec<PushConstantShadow>,
}

impl BoundState {
    pub fn push_constants_mut(&mut self, stage_flags: vk::ShaderStageFlags) -> &mut PushConstantShadow {
        if let Some(idx) = self.push_constants.iter().position(|p| p.stage_flags == stage_flags) {
            return &mut self.push_constants[idx];
        }
        self.push_constants.push(PushConstantShadow {
            stage_flags,
            ranges: Vec::new(),
        });
        self.push_constants.last_mut().unwrap()
    }

    /// `CmdBindDescriptorSets` with an incompatible layout invalidates the
    /// whole push-constant map (`spec.md` §4.3).
    pub fn invalidate_push_constants(&mut self) {
        self.push_constants.clear();
    }

    /// Implements the descriptor-set disturbing rule: slots before `first_set`
    /// whose previous binding is incompatible with `new_layout` up to the last
    /// newly bound index are cleared; slots beyond the newly bound range are
    /// truncated away. Mirrors `original_source/cb.cpp`'s `DescriptorState::bind`.
    pub fn bind_descriptor_sets(
        &mut self,
        new_layout: &Arc<PipelineLayout>,
        first_set: u32,
        sets: &[Arc<DescriptorSet>],
    ) {
        let last_new_set = first_set + sets.len() as u32;
        if (self.descriptor_sets.len() as u32) < last_new_set {
            self.descriptor_sets.resize(last_new_set as usize, None);
        }

        if first_set > 0 {
            let last_index = last_new_set - 1;
            for slot in self.descriptor_sets.iter_mut().take(first_set as usize) {
                let keep = slot
                    .as_ref()
                    .is_some_and(|b| b.bound_with_layout.compatible_up_to(new_layout, last_index));
                if !keep {
                    *slot = None;
                }
            }
        }

        for (i, set) in sets.iter().enumerate() {
            self.descriptor_sets[first_set as usize + i] = Some(DescriptorSlotBinding {
                set: Arc::downgrade(set),
                bound_with_layout: new_layout.clone(),
            });
        }

        self.descriptor_sets.truncate(last_new_set as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::descriptor_set_layout::{DescriptorSetLayoutBinding, DescriptorSetLayout};

    #[test]
    fn push_constant_merge_is_idempotent() {
        let mut shadow = PushConstantShadow::default();
        shadow.merge(0, &[1, 2, 3, 4]);
        let once = shadow.ranges.clone();
        shadow.merge(0, &[1, 2, 3, 4]);
        assert_eq!(shadow.ranges.len(), once.len());
        assert_eq!(shadow.ranges[0].bytes, once[0].bytes);
    }

    #[test]
    fn push_constant_merge_joins_adjacent_ranges() {
        let mut shadow = PushConstantShadow::default();
        shadow.merge(0, &[1, 2, 3, 4]);
        shadow.merge(4, &[5, 6, 7, 8]);
        assert_eq!(shadow.ranges.len(), 1);
        assert_eq!(shadow.ranges[0].offset, 0);
        assert_eq!(shadow.ranges[0].bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn push_constant_merge_overlap_takes_later_bytes() {
        let mut shadow = PushConstantShadow::default();
        shadow.merge(0, &[1, 1, 1, 1]);
        shadow.merge(2, &[9, 9]);
        assert_eq!(shadow.ranges.len(), 1);
        assert_eq!(shadow.ranges[0].bytes, vec![1, 1, 9, 9]);
    }

    #[test]
    fn push_constant_merge_folds_three_adjacent_ranges_in_one_pass() {
        let mut shadow = PushConstantShadow::default();
        shadow.merge(8, &[3, 3]);
        shadow.merge(0, &[1, 1]);
        shadow.merge(4, &[2, 2, 2, 2]);
        assert_eq!(shadow.ranges.len(), 1);
        assert_eq!(shadow.ranges[0].offset, 0);
        assert_eq!(shadow.ranges[0].bytes, vec![1, 1, 2, 2, 2, 2, 3, 3]);
    }

    fn layout_with_one_binding(descriptor_type: vk::DescriptorType) -> Arc<PipelineLayout> {
        let dsl = Arc::new(DescriptorSetLayout::new(
            vk::DescriptorSetLayout::null(),
            vec![DescriptorSetLayoutBinding {
                binding: 0,
                descriptor_type,
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::FRAGMENT,
            }],
        ));
        Arc::new(PipelineLayout::new(vk::PipelineLayout::null(), vec![dsl], vec![]))
    }

    fn descriptor_set(layout: Arc<DescriptorSetLayout>) -> Arc<DescriptorSet> {
        Arc::new(DescriptorSet::new(vk::DescriptorSet::null(), layout))
    }

    #[test]
    fn binding_incompatible_layout_disturbs_earlier_slot() {
        let l1 = layout_with_one_binding(vk::DescriptorType::UNIFORM_BUFFER);
        let l2 = layout_with_one_binding(vk::DescriptorType::STORAGE_BUFFER);
        let mut state = BoundState::default();
        let ds0 = descriptor_set(l1.set_layouts[0].clone());
        state.bind_descriptor_sets(&l1, 0, &[ds0]);
        assert!(state.descriptor_sets[0].is_some());

        let ds1 = descriptor_set(l2.set_layouts[0].clone());
        state.bind_descriptor_sets(&l2, 1, &[ds1]);
        assert!(state.descriptor_sets[0].is_none());
    }

    #[test]
    fn binding_compatible_layout_preserves_earlier_slot() {
        let l1 = layout_with_one_binding(vk::DescriptorType::UNIFORM_BUFFER);
        let mut state = BoundState::default();
        let ds0 = descriptor_set(l1.set_layouts[0].clone());
        state.bind_descriptor_sets(&l1, 0, &[ds0]);

        let ds1 = descriptor_set(l1.set_layouts[0].clone());
        state.bind_descriptor_sets(&l1, 1, &[ds1]);
        assert!(state.descriptor_sets[0].is_some());
    }
}
