//! Per-command-type match rules (`spec.md` §4.7): the concrete scoring
//! between two command nodes of the same kind. Ported from the matching rules
//! exercised in `original_source/src/test/unit/match.cpp` — identical barrier
//! stage masks score 1, a changed stage mask scores below 1, a type mismatch
//! scores 0.

use std::sync::{Arc, Weak};

use ash::vk;

use crate::command::node::{Command, ImageBarrier, SectionKind, SectionLabel};
use crate::command::state::{BoundPipeline, VertexBufferBinding};
use crate::objects::render_pass::RenderPass;

/// `(matched, total)` for comparing two commands — `total` is always > 0 for
/// any pair returned by [`self_match`]; a structural mismatch (different
/// concrete command kind) is represented by [`self_match`] returning `None`
/// rather than by a zero total (`spec.md` §4.7: "`total = -1` means
/// structurally incomparable").
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchScore {
    pub matched: f32,
    pub total: f32,
}

impl MatchScore {
    pub fn full(total: f32) -> Self {
        Self { matched: total, total }
    }

    pub fn zero(total: f32) -> Self {
        Self { matched: 0.0, total }
    }

    pub fn eval(self) -> f32 {
        if self.total <= 0.0 { 0.0 } else { self.matched / self.total }
    }

    fn add(self, other: MatchScore) -> MatchScore {
        MatchScore {
            matched: self.matched + other.matched,
            total: self.total + other.total,
        }
    }
}

fn weak_ptr_eq<T>(a: &Weak<T>, b: &Weak<T>) -> bool {
    match (a.upgrade(), b.upgrade()) {
        (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
        (None, None) => true,
        _ => false,
    }
}

fn pipeline_identity_eq(a: &BoundPipeline, b: &BoundPipeline) -> bool {
    match (a, b) {
        (BoundPipeline::Graphics(a), BoundPipeline::Graphics(b)) => Arc::ptr_eq(a, b),
        (BoundPipeline::Compute(a), BoundPipeline::Compute(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

fn subresource_range_eq(a: &vk::ImageSubresourceRange, b: &vk::ImageSubresourceRange) -> bool {
    a.aspect_mask == b.aspect_mask
        && a.base_mip_level == b.base_mip_level
        && a.level_count == b.level_count
        && a.base_array_layer == b.base_array_layer
        && a.layer_count == b.layer_count
}

fn image_barrier_eq(a: &ImageBarrier, b: &ImageBarrier) -> bool {
    weak_ptr_eq(&a.image, &b.image)
        && a.old_layout == b.old_layout
        && a.new_layout == b.new_layout
        && subresource_range_eq(&a.subresource_range, &b.subresource_range)
}

/// Equal stage masks and per-barrier entries score proportionally to the
/// number of equal entries, matched as an unordered multiset (`spec.md`
/// §4.7).
fn barrier_match(
    src_a: vk::PipelineStageFlags,
    dst_a: vk::PipelineStageFlags,
    barriers_a: &[ImageBarrier],
    src_b: vk::PipelineStageFlags,
    dst_b: vk::PipelineStageFlags,
    barriers_b: &[ImageBarrier],
) -> MatchScore {
    let stage_match = if src_a == src_b && dst_a == dst_b { 1.0 } else { 0.0 };

    let mut used = vec![false; barriers_b.len()];
    let mut matched_entries = 0u32;
    for a in barriers_a {
        for (i, b) in barriers_b.iter().enumerate() {
            if !used[i] && image_barrier_eq(a, b) {
                used[i] = true;
                matched_entries += 1;
                break;
            }
        }
    }
    let entry_total = barriers_a.len().max(barriers_b.len()).max(1) as f32;

    MatchScore {
        matched: stage_match + matched_entries as f32,
        total: 1.0 + entry_total,
    }
}

fn vertex_buffers_eq(a: &Option<VertexBufferBinding>, b: &Option<VertexBufferBinding>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => weak_ptr_eq(&a.buffer, &b.buffer) && a.offset == b.offset,
        (None, None) => true,
        _ => false,
    }
}

/// Sub-score over a draw/dispatch's captured binding snapshot: pipeline
/// identity, vertex/index buffer identity and offsets, and push-constant
/// bytes each contribute one point of `total` (`spec.md` §4.7).
fn state_sub_score(state_a: &crate::command::node::BoundStateSnapshot, state_b: &crate::command::node::BoundStateSnapshot) -> MatchScore {
    let pipeline = match (&state_a.pipeline, &state_b.pipeline) {
        (Some(a), Some(b)) => pipeline_identity_eq(a, b),
        (None, None) => true,
        _ => false,
    };

    let vb_len = state_a.vertex_buffers.len().max(state_b.vertex_buffers.len()).max(1);
    let vb_matched = (0..vb_len)
        .filter(|&i| vertex_buffers_eq(&state_a.vertex_buffers.get(i).cloned().flatten(), &state_b.vertex_buffers.get(i).cloned().flatten()))
        .count();

    let index_eq = match (&state_a.index_buffer, &state_b.index_buffer) {
        (Some(a), Some(b)) => weak_ptr_eq(&a.buffer, &b.buffer) && a.offset == b.offset && a.index_type == b.index_type,
        (None, None) => true,
        _ => false,
    };

    let push_constants_eq = push_constants_bytes_eq(state_a, state_b);

    MatchScore {
        matched: (pipeline as u32 as f32) + vb_matched as f32 + (index_eq as u32 as f32) + (push_constants_eq as u32 as f32),
        total: 1.0 + vb_len as f32 + 1.0 + 1.0,
    }
}

fn push_constants_bytes_eq(a: &crate::command::node::BoundStateSnapshot, b: &crate::command::node::BoundStateSnapshot) -> bool {
    if a.push_constants.len() != b.push_constants.len() {
        return false;
    }
    a.push_constants.iter().all(|shadow_a| {
        b.push_constants.iter().any(|shadow_b| {
            shadow_a.stage_flags == shadow_b.stage_flags
                && shadow_a.ranges.len() == shadow_b.ranges.len()
                && shadow_a
                    .ranges
                    .iter()
                    .zip(shadow_b.ranges.iter())
                    .all(|(ra, rb)| ra.offset == rb.offset && ra.bytes == rb.bytes)
        })
    })
}

/// Exact match on primitive/dispatch counts and pipeline identity is
/// required for any credit on the gate point; mismatches still return a
/// comparable (not structurally-incomparable) score of 0 on that point so the
/// aligner can still consider matching the surrounding state.
fn gated_match(counts_equal: bool, state_a: &crate::command::node::BoundStateSnapshot, state_b: &crate::command::node::BoundStateSnapshot) -> MatchScore {
    let sub = state_sub_score(state_a, state_b);
    let gate = MatchScore {
        matched: if counts_equal { 1.0 } else { 0.0 },
        total: 1.0,
    };
    gate.add(sub)
}

fn label_match(a: &SectionLabel, b: &SectionLabel) -> MatchScore {
    if a.0 == b.0 { MatchScore::full(1.0) } else { MatchScore::zero(1.0) }
}

fn render_pass_section_match(a: &Option<Weak<RenderPass>>, b: &Option<Weak<RenderPass>>) -> MatchScore {
    let descriptions_eq = match (a.as_ref().and_then(Weak::upgrade), b.as_ref().and_then(Weak::upgrade)) {
        (Some(a), Some(b)) => a.description == b.description,
        (None, None) => true,
        _ => false,
    };
    if descriptions_eq { MatchScore::full(1.0) } else { MatchScore::zero(1.0) }
}

/// Self-match between two commands, ignoring a `Section`'s children — the
/// caller folds in the children's alignment separately (`spec.md` §4.7:
/// "Section commands combine their own self-match with their children's
/// alignment"). Returns `None` when the two commands are different concrete
/// kinds, pruning the search at that cell.
pub fn self_match(a: &Command, b: &Command) -> Option<MatchScore> {
    use Command::*;
    match (a, b) {
        (BindPipeline(pa), BindPipeline(pb)) => Some(if pipeline_identity_eq(pa, pb) { MatchScore::full(1.0) } else { MatchScore::zero(1.0) }),

        (
            BindVertexBuffers { first_binding: fa, bindings: ba },
            BindVertexBuffers { first_binding: fb, bindings: bb },
        ) => {
            if fa != fb || ba.len() != bb.len() {
                Some(MatchScore::zero(1.0))
            } else {
                let matched = ba.iter().zip(bb.iter()).filter(|(a, b)| weak_ptr_eq(&a.buffer, &b.buffer) && a.offset == b.offset).count();
                Some(MatchScore {
                    matched: matched as f32,
                    total: ba.len().max(1) as f32,
                })
            }
        }

        (BindIndexBuffer(a), BindIndexBuffer(b)) => Some(if weak_ptr_eq(&a.buffer, &b.buffer) && a.offset == b.offset && a.index_type == b.index_type {
            MatchScore::full(1.0)
        } else {
            MatchScore::zero(1.0)
        }),

        (
            BindDescriptorSets { bind_point: bpa, layout: la, first_set: fa, sets: sa },
            BindDescriptorSets { bind_point: bpb, layout: lb, first_set: fb, sets: sb },
        ) => {
            if bpa != bpb || fa != fb || sa.len() != sb.len() {
                Some(MatchScore::zero(1.0))
            } else {
                let layout_eq = weak_ptr_eq(la, lb) as u32 as f32;
                let matched = (0..sa.len()).filter(|&i| weak_ptr_eq(&sa[i], &sb[i])).count() as f32;
                Some(MatchScore {
                    matched: layout_eq + matched,
                    total: 1.0 + sa.len().max(1) as f32,
                })
            }
        }

        (PushConstants { stage_flags: fa, offset: oa, data: da }, PushConstants { stage_flags: fb, offset: ob, data: db }) => {
            Some(if fa == fb && oa == ob && da == db { MatchScore::full(1.0) } else { MatchScore::zero(1.0) })
        }

        (
            Draw { vertex_count: vca, instance_count: ica, first_vertex: fva, first_instance: fia, state: sa },
            Draw { vertex_count: vcb, instance_count: icb, first_vertex: fvb, first_instance: fib, state: sb },
        ) => {
            let counts_equal = vca == vcb && ica == icb && fva == fvb && fia == fib;
            Some(gated_match(counts_equal, sa, sb))
        }

        (
            DrawIndexed { index_count: ica, instance_count: inca, first_index: fia, vertex_offset: voa, first_instance: fiia, state: sa },
            DrawIndexed { index_count: icb, instance_count: incb, first_index: fib, vertex_offset: vob, first_instance: fiib, state: sb },
        ) => {
            let counts_equal = ica == icb && inca == incb && fia == fib && voa == vob && fiia == fiib;
            Some(gated_match(counts_equal, sa, sb))
        }

        (Dispatch { group_count_x: xa, group_count_y: ya, group_count_z: za, state: sa }, Dispatch { group_count_x: xb, group_count_y: yb, group_count_z: zb, state: sb }) => {
            let counts_equal = xa == xb && ya == yb && za == zb;
            Some(gated_match(counts_equal, sa, sb))
        }

        (CopyBuffer { src: sa, dst: da, regions: ra }, CopyBuffer { src: sb, dst: db, regions: rb }) => {
            Some(if weak_ptr_eq(sa, sb) && weak_ptr_eq(da, db) && ra.len() == rb.len() {
                MatchScore::full(1.0)
            } else {
                MatchScore::zero(1.0)
            })
        }

        (FillBuffer { buffer: ba, offset: oa, size: sa, data: da }, FillBuffer { buffer: bb, offset: ob, size: sb, data: db }) => {
            Some(if weak_ptr_eq(ba, bb) && oa == ob && sa == sb && da == db { MatchScore::full(1.0) } else { MatchScore::zero(1.0) })
        }

        (UpdateBuffer { buffer: ba, offset: oa, data: da }, UpdateBuffer { buffer: bb, offset: ob, data: db }) => {
            Some(if weak_ptr_eq(ba, bb) && oa == ob && da == db { MatchScore::full(1.0) } else { MatchScore::zero(1.0) })
        }

        (PipelineBarrier { src_stage: sa, dst_stage: da, image_barriers: ia }, PipelineBarrier { src_stage: sb, dst_stage: db, image_barriers: ib }) => {
            Some(barrier_match(*sa, *da, ia, *sb, *db, ib))
        }

        (NextSubpass, NextSubpass) => Some(MatchScore::full(1.0)),

        (Section { kind: ka, label: la, render_pass: ra, .. }, Section { kind: kb, label: lb, render_pass: rb, .. }) => {
            if ka != kb {
                return Some(MatchScore::zero(1.0));
            }
            Some(match ka {
                SectionKind::RenderPass => render_pass_section_match(ra, rb),
                SectionKind::DebugLabel => label_match(la, lb),
                SectionKind::ExecuteCommands => MatchScore::full(1.0),
            })
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::node::Command;

    fn barrier(src: vk::PipelineStageFlags, dst: vk::PipelineStageFlags) -> Command {
        Command::PipelineBarrier {
            src_stage: src,
            dst_stage: dst,
            image_barriers: Vec::new(),
        }
    }

    #[test]
    fn identical_barriers_score_full_match() {
        let a = barrier(vk::PipelineStageFlags::ALL_COMMANDS, vk::PipelineStageFlags::COMPUTE_SHADER);
        let b = a.clone();
        let score = self_match(&a, &b).unwrap();
        assert_eq!(score.eval(), 1.0);
        let reverse = self_match(&b, &a).unwrap();
        assert_eq!(reverse.eval(), score.eval());
    }

    #[test]
    fn changed_stage_mask_scores_below_full() {
        let a = barrier(vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::PipelineStageFlags::COMPUTE_SHADER);
        let b = barrier(vk::PipelineStageFlags::ALL_COMMANDS, vk::PipelineStageFlags::COMPUTE_SHADER);
        let score = self_match(&a, &b).unwrap();
        assert!(score.eval() < 1.0);
    }

    #[test]
    fn different_command_kinds_are_incomparable() {
        let a = barrier(vk::PipelineStageFlags::ALL_COMMANDS, vk::PipelineStageFlags::ALL_COMMANDS);
        let b = Command::NextSubpass;
        assert!(self_match(&a, &b).is_none());
    }

    #[test]
    fn label_sections_match_by_name() {
        let a = Command::Section {
            kind: SectionKind::DebugLabel,
            label: SectionLabel(Some("draw".into())),
            render_pass: None,
            children: Vec::new(),
        };
        let b = Command::Section {
            kind: SectionKind::DebugLabel,
            label: SectionLabel(Some("draw".into())),
            render_pass: None,
            children: Vec::new(),
        };
        let c = Command::Section {
            kind: SectionKind::DebugLabel,
            label: SectionLabel(Some("shadow".into())),
            render_pass: None,
            children: Vec::new(),
        };
        assert_eq!(self_match(&a, &b).unwrap().eval(), 1.0);
        assert_eq!(self_match(&a, &c).unwrap().eval(), 0.0);
    }
}
