//! Shadow for `VkDevice`: the object maps, synchronization primitives, and
//! pools every other shadow object and the submission tracker hang off of
//! (`spec.md` §3 "Device").

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use parking_lot::{Mutex, RwLock};

use crate::command::command_buffer::CommandBuffer;
use crate::command::node::NodeId;
use crate::config::LayerConfig;
use crate::gui::Selection;
use crate::hook::{HookExecutor, HookSelection, HookTarget, HookTargetState, Instrumentation, ResultQueue};
use crate::objects::buffer::Buffer;
use crate::objects::buffer_view::BufferView;
use crate::objects::command_pool::CommandPool;
use crate::objects::descriptor_set::DescriptorSet;
use crate::objects::descriptor_set_layout::DescriptorSetLayout;
use crate::objects::device_memory::DeviceMemory;
use crate::objects::event::Event;
use crate::objects::fence::Fence;
use crate::objects::framebuffer::Framebuffer;
use crate::objects::handle::{HandleMeta, Nameable};
use crate::objects::image::Image;
use crate::objects::image_view::ImageView;
use crate::objects::physical_device::PhysicalDevice;
use crate::objects::pipeline::{ComputePipeline, GraphicsPipeline};
use crate::objects::pipeline_layout::PipelineLayout;
use crate::objects::query_pool::QueryPool;
use crate::objects::queue::Queue;
use crate::objects::render_pass::RenderPass;
use crate::objects::sampler::Sampler;
use crate::objects::semaphore::Semaphore;
use crate::objects::shader_module::ShaderModule;
use crate::objects::swapchain::Swapchain;
use crate::registry::dispatch_table;
use crate::registry::ObjectMap;
use crate::submission::driver::DriverDispatch;
use crate::submission::tracker::{PendingSubmission, SubmitBatch, SubmissionTracker};

type Raw = u64;

/// One typed map per Vulkan non-dispatchable object category, plus the
/// synchronization and pooling machinery that make up a device shadow
/// (`spec.md` §3, §4.1).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Device {
    meta: HandleMeta,
    /// The dispatch key the loader wrote into this handle's first machine
    /// word, used to register/unregister this shadow in the process-wide
    /// dispatch table (`spec.md` §4.1) — set only via [`Device::register`];
    /// plain [`Device::new`] instances (tests, fixtures) are never registered.
    dispatch_key: u64,
    #[derivative(Debug = "ignore")]
    handle: vk::Device,
    pub physical_device: Arc<PhysicalDevice>,
    pub config: LayerConfig,
    #[derivative(Debug = "ignore")]
    driver: Arc<dyn DriverDispatch>,

    pub buffers: ObjectMap<Raw, Buffer>,
    pub buffer_views: ObjectMap<Raw, BufferView>,
    pub images: ObjectMap<Raw, Image>,
    pub image_views: ObjectMap<Raw, ImageView>,
    pub samplers: ObjectMap<Raw, Sampler>,
    pub device_memory: ObjectMap<Raw, DeviceMemory>,
    pub descriptor_sets: ObjectMap<Raw, DescriptorSet>,
    pub descriptor_set_layouts: ObjectMap<Raw, DescriptorSetLayout>,
    pub pipeline_layouts: ObjectMap<Raw, PipelineLayout>,
    pub render_passes: ObjectMap<Raw, RenderPass>,
    pub framebuffers: ObjectMap<Raw, Framebuffer>,
    pub graphics_pipelines: ObjectMap<Raw, GraphicsPipeline>,
    pub compute_pipelines: ObjectMap<Raw, ComputePipeline>,
    pub shader_modules: ObjectMap<Raw, ShaderModule>,
    pub query_pools: ObjectMap<Raw, QueryPool>,
    pub command_pools: ObjectMap<Raw, CommandPool>,
    pub fences: ObjectMap<Raw, Fence>,
    pub events: ObjectMap<Raw, Event>,
    pub semaphores: ObjectMap<Raw, Semaphore>,
    pub swapchains: ObjectMap<Raw, Swapchain>,
    pub queues: ObjectMap<Raw, Queue>,

    pub submissions: SubmissionTracker,

    /// Weak "last created swapchain" slot used by the public GUI-facing API
    /// to find a surface to overlay without the caller threading one through
    /// (`spec.md` §3).
    last_swapchain: RwLock<Option<std::sync::Weak<Swapchain>>>,

    /// The GUI's pinned command buffer/node, read-only from the dispatch
    /// layer's point of view (`spec.md` §4.9).
    pub selection: Selection,
    /// The hook's idle/armed/capturing/completed state machine (`spec.md`
    /// §4.8). Armed by [`Device::select_for_hook`]; consulted by
    /// [`Device::submit`].
    pub hook_target: HookTarget,
    /// Completed captures waiting for the GUI to drain them.
    pub hook_results: ResultQueue,
    #[derivative(Debug = "ignore")]
    hook_executor: RwLock<Option<Arc<dyn HookExecutor>>>,
    /// Which in-flight `PendingSubmission` (by id) carries a hook capture, and
    /// what that capture's selection was — read back once the submission
    /// retires.
    #[derivative(Debug = "ignore")]
    hooked_submissions: Mutex<HashMap<u64, HookSelection>>,
}

impl Device {
    pub fn new(handle: vk::Device, physical_device: Arc<PhysicalDevice>, driver: Arc<dyn DriverDispatch>, config: LayerConfig) -> Self {
        Self {
            meta: HandleMeta::new(),
            dispatch_key: 0,
            handle,
            physical_device,
            config,
            driver,
            buffers: ObjectMap::new(),
            buffer_views: ObjectMap::new(),
            images: ObjectMap::new(),
            image_views: ObjectMap::new(),
            samplers: ObjectMap::new(),
            device_memory: ObjectMap::new(),
            descriptor_sets: ObjectMap::new(),
            descriptor_set_layouts: ObjectMap::new(),
            pipeline_layouts: ObjectMap::new(),
            render_passes: ObjectMap::new(),
            framebuffers: ObjectMap::new(),
            graphics_pipelines: ObjectMap::new(),
            compute_pipelines: ObjectMap::new(),
            shader_modules: ObjectMap::new(),
            query_pools: ObjectMap::new(),
            command_pools: ObjectMap::new(),
            fences: ObjectMap::new(),
            events: ObjectMap::new(),
            semaphores: ObjectMap::new(),
            swapchains: ObjectMap::new(),
            queues: ObjectMap::new(),
            submissions: SubmissionTracker::new(),
            last_swapchain: RwLock::new(None),
            selection: Selection::new(),
            hook_target: HookTarget::new(),
            hook_results: ResultQueue::new(16),
            hook_executor: RwLock::new(None),
            hooked_submissions: Mutex::new(HashMap::new()),
        }
    }

    /// Build the shadow for a freshly created device and register it in the
    /// process-wide dispatch table under its dispatch key (`spec.md` §4.1),
    /// mirroring [`crate::objects::instance::Instance::register`].
    pub fn register(
        handle: vk::Device,
        dispatch_key: u64,
        physical_device: Arc<PhysicalDevice>,
        driver: Arc<dyn DriverDispatch>,
        config: LayerConfig,
    ) -> Arc<Self> {
        let mut device = Self::new(handle, physical_device, driver, config);
        device.dispatch_key = dispatch_key;
        let device = Arc::new(device);
        dispatch_table().insert(dispatch_key, device.clone());
        device
    }

    /// Remove this device from the dispatch table. Must be called from
    /// `vkDestroyDevice` once [`Device::is_quiescent`] holds.
    pub fn unregister(&self) {
        dispatch_table().remove(self.dispatch_key);
    }

    pub fn handle(&self) -> vk::Device {
        self.handle
    }

    pub fn driver(&self) -> &dyn DriverDispatch {
        self.driver.as_ref()
    }

    pub fn set_last_swapchain(&self, swapchain: &Arc<Swapchain>) {
        *self.last_swapchain.write() = Some(Arc::downgrade(swapchain));
    }

    pub fn last_swapchain(&self) -> Option<Arc<Swapchain>> {
        self.last_swapchain.read().as_ref().and_then(std::sync::Weak::upgrade)
    }

    /// `vkDeviceWaitIdle`: drains pending submissions, then every object map
    /// must be empty before the caller proceeds to destroy the device
    /// (testable property 1, scenario E1).
    pub fn wait_idle(&self) -> crate::error::Result<()> {
        self.submissions.wait_idle(self.driver.as_ref())
    }

    pub fn is_quiescent(&self) -> bool {
        self.buffers.is_empty()
            && self.images.is_empty()
            && self.image_views.is_empty()
            && self.device_memory.is_empty()
            && self.descriptor_sets.is_empty()
            && self.command_pools.is_empty()
            && self.submissions.pending_count() == 0
    }

    /// Installs the (external) collaborator that builds instrumented
    /// secondaries and reads their captures back. Without one, a GUI
    /// selection still arms the hook target but [`Device::submit`] never
    /// finds a substitute to make, so the armed selection just waits.
    pub fn set_hook_executor(&self, executor: Arc<dyn HookExecutor>) {
        *self.hook_executor.write() = Some(executor);
    }

    pub fn hook_executor(&self) -> Option<Arc<dyn HookExecutor>> {
        self.hook_executor.read().clone()
    }

    /// GUI-facing entry point (`spec.md` §4.9): pins `command_buffer`/`node`
    /// for display and arms the hook so the next submission whose batches
    /// still carry this exact recording gets instrumented.
    pub fn select_for_hook(&self, command_buffer: &Arc<CommandBuffer>, node: NodeId, subpass: usize, instrumentation: Instrumentation) -> crate::error::Result<()> {
        self.selection.select(command_buffer, node);
        self.hook_target.select(HookSelection {
            reset_count: command_buffer.reset_count(),
            node,
            subpass,
            instrumentation,
        })
    }

    /// `vkQueueSubmit`'s device-level entry point (`spec.md` §4.5, §4.8):
    /// substitutes the armed hook's instrumented secondary for its original
    /// command buffer, if one is due, before handing the batches to
    /// [`SubmissionTracker::submit`], and drains any earlier capture whose
    /// submission has since retired.
    pub fn submit(&self, queue: vk::Queue, mut batches: Vec<SubmitBatch>, app_fence: Option<Arc<Fence>>) -> crate::error::Result<Arc<PendingSubmission>> {
        self.poll_hook_completions();
        let hooked = self.try_hook_batches(&mut batches);
        let submission = self.submissions.submit(self.driver.as_ref(), queue, batches, app_fence)?;
        if let Some(selection) = hooked {
            self.hooked_submissions.lock().insert(submission.id(), selection);
        }
        Ok(submission)
    }

    /// Substitutes the hook's instrumented secondary into whichever batch
    /// carries the selected command buffer, if the hook is armed, an executor
    /// is installed, and the selected record is still the one selected
    /// against (`spec.md` §4.8's refuse-if-not-splittable and reset_count
    /// invalidation rules both apply here).
    fn try_hook_batches(&self, batches: &mut [SubmitBatch]) -> Option<HookSelection> {
        if self.hook_target.state() != HookTargetState::Armed {
            return None;
        }
        let (selected_cb, _node) = self.selection.current()?;
        let executor = self.hook_executor()?;
        let slot = batches.iter().enumerate().find_map(|(i, batch)| {
            batch.command_buffers.iter().position(|cb| Arc::ptr_eq(cb, &selected_cb)).map(|j| (i, j))
        })?;

        let render_pass = selected_cb
            .record()
            .lock()
            .render_pass_for_node(self.hook_target.selection()?.node);
        let description = render_pass.as_deref()?;
        let selection = match self.hook_target.begin_capture(description) {
            Ok(selection) => selection,
            Err(err) => {
                crate::layer_warn!(&self.config, "{err}");
                return None;
            }
        };

        match executor.capture(&selected_cb, selection) {
            Ok(substitute) => {
                batches[slot.0].command_buffers[slot.1] = substitute;
                Some(selection)
            }
            Err(err) => {
                crate::layer_warn!(&self.config, "hook capture failed: {err}");
                self.hook_target.clear();
                None
            }
        }
    }

    /// Reads back any completed hook capture whose submission has already
    /// retired, pushes the result onto [`Device::hook_results`], and rearms
    /// the hook's state machine to `Completed` (`spec.md` §4.8).
    fn poll_hook_completions(&self) {
        let Some(executor) = self.hook_executor() else {
            return;
        };
        let mut hooked = self.hooked_submissions.lock();
        if hooked.is_empty() {
            return;
        }
        hooked.retain(|id, selection| {
            if self.submissions.is_pending(*id) {
                return true;
            }
            let result = executor.read_back(*selection);
            self.hook_results.push(result);
            self.hook_target.complete();
            false
        });
    }

    /// Called from the command buffer's destroy path (`vkFreeCommandBuffers`,
    /// `vkDestroyCommandPool`). Drops both the GUI selection and an armed hook
    /// target if either still points at `command_buffer`, per §4.9's
    /// invalidation rule — a destroyed command buffer can't back a future
    /// submit for the hook to find.
    pub fn notify_command_buffer_destroyed(&self, command_buffer: &Arc<CommandBuffer>) {
        let was_selected = self
            .selection
            .current()
            .is_some_and(|(cb, _)| Arc::ptr_eq(&cb, command_buffer));
        self.selection.unselect_if(command_buffer);
        if was_selected && self.hook_target.state() != HookTargetState::Capturing {
            self.hook_target.clear();
        }
    }
}

impl Nameable for Device {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::device_memory::AllocationOwner;
    use crate::submission::driver::mock::MockDriver;

    fn new_device() -> Device {
        let phys = PhysicalDevice::register(vk::PhysicalDevice::null(), 1, vk::PhysicalDeviceProperties::default(), Vec::new());
        Device::new(vk::Device::null(), phys, Arc::new(MockDriver::new()), LayerConfig::default())
    }

    #[test]
    fn fresh_device_is_quiescent() {
        let device = new_device();
        assert!(device.is_quiescent());
    }

    #[test]
    fn e1_create_destroy_roundtrip_leaves_maps_empty() {
        let device = new_device();
        let buf = device.buffers.insert(
            1,
            Buffer::new(
                vk::Buffer::null(),
                crate::objects::buffer::BufferCreateInfo {
                    size: 1024,
                    usage: vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                },
            ),
        );
        assert!(!device.is_quiescent());
        let mem = device.device_memory.insert(1, DeviceMemory::new(vk::DeviceMemory::null(), 1024, 0));
        assert!(mem.bind(0, 1024, AllocationOwner::Buffer(Arc::downgrade(&buf))));
        mem.release_buffer(&buf);
        drop(buf);
        device.buffers.remove(&1);
        device.device_memory.remove(&1);
        assert!(device.is_quiescent());
    }
}
