//! Scenario E2 (`spec.md` §7): one primary command buffer records
//! `FillBuffer`, `CopyBuffer`, `UpdateBuffer` in order; submitted with a
//! borrowed fence, waiting on it drains the command buffer's pending list and
//! detaches the fence.

use std::sync::Arc;

use ash::vk;

use vklens::command::command_buffer::CommandBuffer;
use vklens::command::node::Command;
use vklens::config::LayerConfig;
use vklens::objects::buffer::{Buffer, BufferCreateInfo};
use vklens::objects::command_pool::CommandPool;
use vklens::objects::fence::Fence;
use vklens::submission::tracker::SubmitBatch;

mod framework;

fn new_buffer() -> Arc<Buffer> {
    Arc::new(Buffer::new(
        vk::Buffer::null(),
        BufferCreateInfo {
            size: 1024,
            usage: vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
        },
    ))
}

#[test]
fn e2_record_and_retire() {
    let ctx = framework::make_context();
    let pool = ctx.device.command_pools.insert(1, CommandPool::new(vk::CommandPool::null(), 0));
    let cb = Arc::new(CommandBuffer::new(vk::CommandBuffer::null(), Arc::downgrade(&pool), true));
    let buf = new_buffer();

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

    let nodes = cb.record().lock().nodes().to_vec();
    assert_eq!(nodes.len(), 3, "exactly three top-level nodes in recording order");
    match &nodes[0].command {
        Command::FillBuffer { offset, size, data, .. } => {
            assert_eq!(*offset, 0);
            assert_eq!(*size, 32);
            assert_eq!(*data, 0xC0DE00FF);
        }
        _ => panic!("expected FillBuffer at node 0"),
    }
    match &nodes[1].command {
        Command::CopyBuffer { regions, .. } => {
            assert_eq!(regions.len(), 1);
            assert_eq!(regions[0].src_offset, 0);
            assert_eq!(regions[0].dst_offset, 32);
            assert_eq!(regions[0].size, 32);
        }
        _ => panic!("expected CopyBuffer at node 1"),
    }
    match &nodes[2].command {
        Command::UpdateBuffer { offset, data, .. } => {
            assert_eq!(*offset, 64);
            assert_eq!(data.len(), 128);
        }
        _ => panic!("expected UpdateBuffer at node 2"),
    }

    let app_fence = Arc::new(Fence::new(vk::Fence::null(), false));
    let batch = SubmitBatch::new(vec![cb.clone()]);
    let submission = ctx
        .device
        .submissions
        .submit(ctx.device.driver(), vk::Queue::null(), vec![batch], Some(app_fence.clone()))
        .unwrap();
    assert!(cb.is_pending());
    assert!(Arc::ptr_eq(submission.fence(), &app_fence));

    ctx.driver.signal(app_fence.handle());
    ctx.device.wait_idle().unwrap();

    assert!(!cb.is_pending(), "retirement returns the command buffer to executable");
    assert!(app_fence.attached_submission().is_none(), "the borrowed fence's submission pointer is cleared on retirement");
}
