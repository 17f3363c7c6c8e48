//! Headless test fixture, analogous to the teacher's own
//! `tests/framework/mod.rs::make_context` — except there is no real GPU to
//! request here, so the fixture is headless by construction rather than by
//! an explicit `HeadlessWindowInterface` opt-in.

use std::sync::Arc;

use ash::vk;

use vklens::config::LayerConfig;
use vklens::objects::device::Device;
use vklens::objects::physical_device::PhysicalDevice;
use vklens::submission::driver::mock::MockDriver;

pub struct Context {
    pub device: Arc<Device>,
    pub driver: Arc<MockDriver>,
}

/// Builds a device shadow wired to a fresh [`MockDriver`], with no instance
/// or physical-device enumeration machinery involved — every scenario this
/// suite exercises starts from an already-created device (`spec.md` §5).
pub fn make_context() -> Context {
    let physical_device = PhysicalDevice::register(
        vk::PhysicalDevice::null(),
        1,
        vk::PhysicalDeviceProperties::default(),
        Vec::new(),
    );
    let driver = Arc::new(MockDriver::new());
    let device = Arc::new(Device::new(vk::Device::null(), physical_device, driver.clone(), LayerConfig::default()));
    Context { device, driver }
}
