//! Layout tracker (component F, `spec.md` §4.6): pending-image-layout state
//! across submissions, and the render-pass splittability predicate the
//! command hook needs before it can instrument mid-render-pass.
//!
//! The pending-layout state itself lives on [`crate::objects::image::Image`]
//! (`pending_layout`/`set_pending_layout`) and is written by
//! [`crate::submission::tracker::SubmissionTracker::submit`] from the layout
//! changes each command buffer's record observed
//! ([`crate::command::resource_use::ResourceUseTable::layout_changes`]). This
//! module holds the one piece of layout-tracking logic that isn't just a field
//! read/write: the splittability check.

use ash::vk;

use crate::objects::render_pass::RenderPassDescription;

/// Whether `description` can be split into two render-pass instances at
/// `subpass`. A render pass is splittable at subpass N when no subpass at or
/// after N writes, via a resolve attachment, into an attachment that subpass
/// N reads or blends — splitting there would make that resolve overwrite data
/// the application expected the original single instance to preserve
/// (`spec.md` §4.6, testable property 9). Subpass N's own resolve attachments
/// count too: resolving into an attachment N itself reads is never safe to
/// split around, split or not.
pub fn is_splittable_at(description: &RenderPassDescription, subpass: usize) -> bool {
    let Some(target) = description.subpasses.get(subpass) else {
        return false;
    };
    let read_or_blended: std::collections::HashSet<u32> = target
        .input_attachments
        .iter()
        .copied()
        .chain(target.color_attachments.iter().copied())
        .filter(|&a| a != vk::ATTACHMENT_UNUSED)
        .collect();

    description
        .subpasses
        .iter()
        .skip(subpass)
        .all(|later| {
            later
                .resolve_attachments
                .iter()
                .copied()
                .filter(|&a| a != vk::ATTACHMENT_UNUSED)
                .all(|resolve_target| !read_or_blended.contains(&resolve_target))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::render_pass::{AttachmentDescription, SubpassDescription};

    fn attachment() -> AttachmentDescription {
        AttachmentDescription {
            format: vk::Format::R8G8B8A8_UNORM,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// A reference implementation that actually simulates the split: walk
    /// every resolve target at or after the candidate subpass and compare
    /// against its read/blend set the long way, as an oracle for testable
    /// property 9.
    fn reference_splittable(description: &RenderPassDescription, subpass: usize) -> bool {
        let Some(target) = description.subpasses.get(subpass) else {
            return false;
        };
        let mut read_or_blended = Vec::new();
        read_or_blended.extend(target.input_attachments.iter().copied());
        read_or_blended.extend(target.color_attachments.iter().copied());
        read_or_blended.retain(|&a| a != vk::ATTACHMENT_UNUSED);

        for later in description.subpasses.iter().skip(subpass) {
            for &resolve_target in &later.resolve_attachments {
                if resolve_target == vk::ATTACHMENT_UNUSED {
                    continue;
                }
                if read_or_blended.contains(&resolve_target) {
                    return false;
                }
            }
        }
        true
    }

    fn subpass(color: &[u32], resolve: &[u32]) -> SubpassDescription {
        SubpassDescription {
            color_attachments: color.to_vec(),
            resolve_attachments: resolve.to_vec(),
            ..Default::default()
        }
    }

    fn check_all(desc: &RenderPassDescription) {
        for i in 0..desc.subpasses.len() {
            assert_eq!(is_splittable_at(desc, i), reference_splittable(desc, i), "subpass {i}");
        }
    }

    /// Resolving subpass 2's multisampled color into attachment 0 blocks
    /// splitting before it, because subpasses 0 and 1 still blend into
    /// attachment 0 (ported from `rpsplit.cpp`'s `unit_rpsplit_basic`).
    #[test]
    fn resolve_into_attachment_blended_by_earlier_subpasses_blocks_split() {
        let desc = RenderPassDescription {
            attachments: vec![attachment(), attachment()],
            subpasses: vec![
                subpass(&[0, 1], &[]),
                subpass(&[0, 1], &[]),
                subpass(&[1], &[0]),
            ],
        };
        check_all(&desc);
        assert!(!is_splittable_at(&desc, 0));
        assert!(!is_splittable_at(&desc, 1));
        assert!(is_splittable_at(&desc, 2));
    }

    /// A single subpass resolving has nothing later to conflict with
    /// (`unit_rpsplit_single_resolve`).
    #[test]
    fn lone_resolving_subpass_is_splittable() {
        let desc = RenderPassDescription {
            attachments: vec![attachment(), attachment()],
            subpasses: vec![subpass(&[1], &[0])],
        };
        check_all(&desc);
        assert!(is_splittable_at(&desc, 0));
    }

    /// A later subpass reading an attachment as an input attachment (not just
    /// color) still blocks the split if a resolve later targets it
    /// (`unit_rpsplit_input_att`).
    #[test]
    fn later_input_attachment_read_blocks_split() {
        let desc = RenderPassDescription {
            attachments: vec![attachment(), attachment(), attachment()],
            subpasses: vec![
                SubpassDescription {
                    color_attachments: vec![2],
                    resolve_attachments: vec![0],
                    input_attachments: vec![0],
                    ..Default::default()
                },
            ],
        };
        check_all(&desc);
        assert!(!is_splittable_at(&desc, 0));
    }

    /// `vk::ATTACHMENT_UNUSED` slots must never be treated as a real
    /// attachment index (`unit_rpsplit_unused`).
    #[test]
    fn unused_attachment_slots_are_ignored() {
        let desc = RenderPassDescription {
            attachments: vec![attachment(), attachment(), attachment(), attachment()],
            subpasses: vec![
                subpass(&[0, 1], &[]),
                subpass(&[0, 1], &[]),
                subpass(&[1, vk::ATTACHMENT_UNUSED], &[]),
                subpass(&[0, vk::ATTACHMENT_UNUSED], &[2, 3]),
            ],
        };
        check_all(&desc);
        for i in 0..desc.subpasses.len() {
            assert!(is_splittable_at(&desc, i), "subpass {i} should be splittable");
        }
    }
}
