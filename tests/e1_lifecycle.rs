//! Scenario E1 (`spec.md` §7): create/destroy roundtrip leaves every shadow
//! map empty and never panics.

use std::sync::Arc;

use ash::vk;

use vklens::objects::buffer::{Buffer, BufferCreateInfo};
use vklens::objects::device_memory::{AllocationOwner, DeviceMemory};

mod framework;

#[test]
fn e1_create_destroy_roundtrip_leaves_maps_empty() {
    let ctx = framework::make_context();
    assert!(ctx.device.is_quiescent(), "a fresh device has no live shadows");

    let buffer = ctx.device.buffers.insert(
        1,
        Buffer::new(
            vk::Buffer::null(),
            BufferCreateInfo {
                size: 1024,
                usage: vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
            },
        ),
    );
    assert!(!ctx.device.is_quiescent(), "the device still owns the buffer's shadow");

    let memory = ctx.device.device_memory.insert(1, DeviceMemory::new(vk::DeviceMemory::null(), 1024, 0));
    assert!(memory.bind(0, 1024, AllocationOwner::Buffer(Arc::downgrade(&buffer))), "fresh memory has the full range free");

    memory.release_buffer(&buffer);
    drop(buffer);
    ctx.device.buffers.remove(&1);
    ctx.device.device_memory.remove(&1);

    assert!(ctx.device.is_quiescent(), "no leaks after the full create/bind/destroy roundtrip");
}
