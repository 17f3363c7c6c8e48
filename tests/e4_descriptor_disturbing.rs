//! Scenario E4 (`spec.md` §7): binding an incompatible pipeline layout at a
//! higher set index clears an earlier, now-incompatible slot.

use std::sync::Arc;

use ash::vk;

use vklens::command::command_buffer::CommandBuffer;
use vklens::objects::command_pool::CommandPool;
use vklens::objects::descriptor_set::DescriptorSet;
use vklens::objects::descriptor_set_layout::{DescriptorSetLayout, DescriptorSetLayoutBinding};
use vklens::objects::pipeline_layout::PipelineLayout;

mod framework;

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
fn e4_descriptor_disturbing() {
    let ctx = framework::make_context();
    let pool = ctx.device.command_pools.insert(1, CommandPool::new(vk::CommandPool::null(), 0));
    let cb = Arc::new(CommandBuffer::new(vk::CommandBuffer::null(), Arc::downgrade(&pool), true));

    let l1 = layout_with_one_binding(vk::DescriptorType::UNIFORM_BUFFER);
    let l2 = layout_with_one_binding(vk::DescriptorType::STORAGE_BUFFER);

    cb.begin().unwrap();
    let ds0 = descriptor_set(l1.set_layouts[0].clone());
    cb.cmd_bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, &l1, 0, &[ds0]).unwrap();
    assert!(cb.record().lock().state.descriptor_sets[0].is_some());

    let ds1 = descriptor_set(l2.set_layouts[0].clone());
    cb.cmd_bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, &l2, 1, &[ds1]).unwrap();
    assert!(
        cb.record().lock().state.descriptor_sets[0].is_none(),
        "an incompatible layout at set 1 disturbs the incompatible set-0 slot"
    );
}
