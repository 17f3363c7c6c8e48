//! The narrow slice of the driver's dispatch table the submission tracker calls
//! through to. The rest of the Vulkan API is resolved and forwarded the same
//! way, but isn't this crate's concern to model (`spec.md` §1's external
//! collaborators).

use std::os::raw::c_char;

use ash::vk;

/// One `VkSubmitInfo` entry in raw-handle form: everything `queue_submit`
/// needs from a batch, after the hook (component H) has had its chance to
/// substitute any of the command buffers with an instrumented re-recording.
/// Kept handle-only (rather than reusing `submission::tracker::SubmitBatch`
/// directly) so this module stays a leaf the tracker depends on, not the
/// other way around.
#[derive(Default)]
pub struct RawSubmitBatch {
    pub wait_semaphores: Vec<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    pub command_buffers: Vec<vk::CommandBuffer>,
}

/// Resolved, per-device driver entry points the layer calls through after doing
/// its own bookkeeping. In a loaded layer these come from `vkGetDeviceProcAddr`
/// on the next link in the dispatch chain; here they are a trait object so the
/// tracker can be exercised against a mock in tests, matching the ambient test
/// stack described in SPEC_FULL.md §2.
pub trait DriverDispatch: Send + Sync {
    /// Forwards to `vkQueueSubmit`. `batches` carries the real wait/signal
    /// semaphores and command buffers for this submission, already
    /// substituted with hooked re-recordings where applicable — the
    /// application's workload must actually reach the driver (`spec.md` §6).
    fn queue_submit(&self, queue: vk::Queue, batches: &[RawSubmitBatch], fence: vk::Fence) -> vk::Result;

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, vk::Result>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn get_fence_status(&self, fence: vk::Fence) -> Result<bool, vk::Result>;
    fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout_ns: u64) -> vk::Result;
    fn reset_fences(&self, fences: &[vk::Fence]) -> vk::Result;

    fn create_semaphore(&self) -> Result<vk::Semaphore, vk::Result>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
}

unsafe fn resolve<F>(device: vk::Device, gdpa: vk::PFN_vkGetDeviceProcAddr, name: &'static [u8]) -> Option<F> {
    let gdpa = gdpa?;
    let f = gdpa(device, name.as_ptr() as *const c_char)?;
    Some(std::mem::transmute_copy(&f))
}

/// The real [`DriverDispatch`] used once the layer is actually loaded by the
/// Vulkan loader: every method resolved once at device-creation time via the
/// next link's `vkGetDeviceProcAddr` (`registry::loader::vk_create_device`),
/// then called through directly without re-resolving per call.
pub struct AshDriver {
    device: vk::Device,
    queue_submit: vk::PFN_vkQueueSubmit,
    create_fence: vk::PFN_vkCreateFence,
    destroy_fence: vk::PFN_vkDestroyFence,
    get_fence_status: vk::PFN_vkGetFenceStatus,
    wait_for_fences: vk::PFN_vkWaitForFences,
    reset_fences: vk::PFN_vkResetFences,
    create_semaphore: vk::PFN_vkCreateSemaphore,
    destroy_semaphore: vk::PFN_vkDestroySemaphore,
}

impl AshDriver {
    /// # Safety
    /// `gdpa` must be the next link's `vkGetDeviceProcAddr` for `device`.
    pub unsafe fn new(device: vk::Device, gdpa: vk::PFN_vkGetDeviceProcAddr) -> Self {
        Self {
            device,
            queue_submit: resolve(device, gdpa, b"vkQueueSubmit\0"),
            create_fence: resolve(device, gdpa, b"vkCreateFence\0"),
            destroy_fence: resolve(device, gdpa, b"vkDestroyFence\0"),
            get_fence_status: resolve(device, gdpa, b"vkGetFenceStatus\0"),
            wait_for_fences: resolve(device, gdpa, b"vkWaitForFences\0"),
            reset_fences: resolve(device, gdpa, b"vkResetFences\0"),
            create_semaphore: resolve(device, gdpa, b"vkCreateSemaphore\0"),
            destroy_semaphore: resolve(device, gdpa, b"vkDestroySemaphore\0"),
        }
    }
}

impl DriverDispatch for AshDriver {
    fn queue_submit(&self, queue: vk::Queue, batches: &[RawSubmitBatch], fence: vk::Fence) -> vk::Result {
        let Some(f) = self.queue_submit else {
            return vk::Result::ERROR_EXTENSION_NOT_PRESENT;
        };
        if batches.is_empty() {
            return unsafe { f(queue, 0, std::ptr::null(), fence) };
        }

        // Per-batch arrays must outlive the `VkSubmitInfo`s pointing into them,
        // hence the two-pass collect instead of building `SubmitInfo` directly
        // in the first `map`.
        struct BatchArrays {
            wait_semaphores: Vec<vk::Semaphore>,
            wait_stages: Vec<vk::PipelineStageFlags>,
            command_buffers: Vec<vk::CommandBuffer>,
            signal_semaphores: Vec<vk::Semaphore>,
        }

        let arrays: Vec<BatchArrays> = batches
            .iter()
            .map(|b| BatchArrays {
                wait_semaphores: b.wait_semaphores.iter().map(|(s, _)| *s).collect(),
                wait_stages: b.wait_semaphores.iter().map(|(_, stage)| *stage).collect(),
                command_buffers: b.command_buffers.clone(),
                signal_semaphores: b.signal_semaphores.clone(),
            })
            .collect();

        let submit_infos: Vec<vk::SubmitInfo> = arrays
            .iter()
            .map(|b| vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                p_next: std::ptr::null(),
                wait_semaphore_count: b.wait_semaphores.len() as u32,
                p_wait_semaphores: b.wait_semaphores.as_ptr(),
                p_wait_dst_stage_mask: b.wait_stages.as_ptr(),
                command_buffer_count: b.command_buffers.len() as u32,
                p_command_buffers: b.command_buffers.as_ptr(),
                signal_semaphore_count: b.signal_semaphores.len() as u32,
                p_signal_semaphores: b.signal_semaphores.as_ptr(),
            })
            .collect();

        unsafe { f(queue, submit_infos.len() as u32, submit_infos.as_ptr(), fence) }
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, vk::Result> {
        let Some(f) = self.create_fence else {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        };
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let create_info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags,
        };
        let mut fence = vk::Fence::null();
        let result = unsafe { f(self.device, &create_info as *const _, std::ptr::null(), &mut fence as *mut _) };
        if result == vk::Result::SUCCESS {
            Ok(fence)
        } else {
            Err(result)
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        if let Some(f) = self.destroy_fence {
            unsafe { f(self.device, fence, std::ptr::null()) };
        }
    }

    fn get_fence_status(&self, fence: vk::Fence) -> Result<bool, vk::Result> {
        let Some(f) = self.get_fence_status else {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        };
        match unsafe { f(self.device, fence) } {
            vk::Result::SUCCESS => Ok(true),
            vk::Result::NOT_READY => Ok(false),
            other => Err(other),
        }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], wait_all: bool, timeout_ns: u64) -> vk::Result {
        match self.wait_for_fences {
            Some(f) => unsafe { f(self.device, fences.len() as u32, fences.as_ptr(), wait_all as vk::Bool32, timeout_ns) },
            None => vk::Result::ERROR_EXTENSION_NOT_PRESENT,
        }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> vk::Result {
        match self.reset_fences {
            Some(f) => unsafe { f(self.device, fences.len() as u32, fences.as_ptr()) },
            None => vk::Result::ERROR_EXTENSION_NOT_PRESENT,
        }
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore, vk::Result> {
        let Some(f) = self.create_semaphore else {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        };
        let create_info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::SemaphoreCreateFlags::empty(),
        };
        let mut semaphore = vk::Semaphore::null();
        let result = unsafe { f(self.device, &create_info as *const _, std::ptr::null(), &mut semaphore as *mut _) };
        if result == vk::Result::SUCCESS {
            Ok(semaphore)
        } else {
            Err(result)
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        if let Some(f) = self.destroy_semaphore {
            unsafe { f(self.device, semaphore, std::ptr::null()) };
        }
    }
}

/// A driver double usable both by this crate's own unit tests and by the
/// top-level integration suite under `tests/` (which links the plain, non-
/// `cfg(test)` rlib, hence the `test-support` feature rather than `cfg(test)`
/// alone).
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    use parking_lot::Mutex;

    use super::*;

    /// A driver double that hands out monotonically increasing fake handles and
    /// tracks which fences have been "signaled" by the test.
    #[derive(Default)]
    pub struct MockDriver {
        next_handle: AtomicU64,
        signaled: Mutex<HashSet<u64>>,
    }

    impl MockDriver {
        pub fn new() -> Self {
            Self::default()
        }

        fn fresh_handle(&self) -> u64 {
            self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
        }

        pub fn signal(&self, fence: vk::Fence) {
            use ash::vk::Handle;
            self.signaled.lock().insert(fence.as_raw());
        }
    }

    impl DriverDispatch for MockDriver {
        fn queue_submit(&self, _queue: vk::Queue, _batches: &[RawSubmitBatch], _fence: vk::Fence) -> vk::Result {
            vk::Result::SUCCESS
        }

        fn create_fence(&self, signaled: bool) -> Result<vk::Fence, vk::Result> {
            use ash::vk::Handle;
            let handle = vk::Fence::from_raw(self.fresh_handle());
            if signaled {
                self.signaled.lock().insert(handle.as_raw());
            }
            Ok(handle)
        }

        fn destroy_fence(&self, fence: vk::Fence) {
            use ash::vk::Handle;
            self.signaled.lock().remove(&fence.as_raw());
        }

        fn get_fence_status(&self, fence: vk::Fence) -> Result<bool, vk::Result> {
            use ash::vk::Handle;
            Ok(self.signaled.lock().contains(&fence.as_raw()))
        }

        fn wait_for_fences(&self, _fences: &[vk::Fence], _wait_all: bool, _timeout_ns: u64) -> vk::Result {
            vk::Result::SUCCESS
        }

        fn reset_fences(&self, fences: &[vk::Fence]) -> vk::Result {
            use ash::vk::Handle;
            let mut signaled = self.signaled.lock();
            for f in fences {
                signaled.remove(&f.as_raw());
            }
            vk::Result::SUCCESS
        }

        fn create_semaphore(&self) -> Result<vk::Semaphore, vk::Result> {
            use ash::vk::Handle;
            Ok(vk::Semaphore::from_raw(self.fresh_handle()))
        }

        fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {}
    }
}
