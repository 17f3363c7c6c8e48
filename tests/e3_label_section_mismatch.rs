//! Scenario E3 (`spec.md` §7): mismatched debug-label nesting around render
//! passes still records successfully, and the two trailing unmatched
//! `BeginDebugUtilsLabel`s are implicitly closed at `EndCommandBuffer` with a
//! warning.

use std::sync::Arc;

use ash::vk;

use vklens::command::command_buffer::CommandBuffer;
use vklens::config::LayerConfig;
use vklens::objects::command_pool::CommandPool;
use vklens::objects::render_pass::{RenderPass, RenderPassDescription};

mod framework;

fn empty_render_pass() -> Arc<RenderPass> {
    Arc::new(RenderPass::new(
        vk::RenderPass::null(),
        RenderPassDescription {
            attachments: Vec::new(),
            subpasses: Vec::new(),
        },
    ))
}

#[test]
fn e3_label_section_mismatch() {
    let ctx = framework::make_context();
    let pool = ctx.device.command_pools.insert(1, CommandPool::new(vk::CommandPool::null(), 0));
    let cb = Arc::new(CommandBuffer::new(vk::CommandBuffer::null(), Arc::downgrade(&pool), true));
    let rp = empty_render_pass();

    cb.begin().unwrap();
    cb.cmd_begin_debug_label("A".into()).unwrap();
    cb.cmd_begin_render_pass(&rp).unwrap();
    cb.cmd_end_debug_label().unwrap();
    cb.cmd_end_render_pass().unwrap();
    cb.cmd_end_debug_label().unwrap();
    cb.cmd_end_debug_label().unwrap();
    cb.cmd_begin_render_pass(&rp).unwrap();
    cb.cmd_begin_debug_label("B".into()).unwrap();
    cb.cmd_end_render_pass().unwrap();
    cb.cmd_begin_debug_label("C1".into()).unwrap();
    cb.cmd_begin_debug_label("C2".into()).unwrap();
    cb.end(&LayerConfig::default()).unwrap();

    let unbalanced = cb.record().lock().unbalanced_labels_closed;
    assert_eq!(unbalanced, 2, "the two trailing C1/C2 labels are implicitly closed at EndCommandBuffer");
}
