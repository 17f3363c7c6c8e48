//! `vkQueueSubmit` interception and submission retirement (`spec.md` §4.5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::command::command_buffer::CommandBuffer;
use crate::error::{Error, Result};
use crate::objects::fence::Fence;
use crate::objects::semaphore::Semaphore;
use crate::submission::driver::{DriverDispatch, RawSubmitBatch};
use crate::submission::pools::{FencePool, SemaphorePool};

static NEXT_SUBMISSION_ID: AtomicU64 = AtomicU64::new(1);

/// One `VkSubmitInfo` entry: the wait/signal semaphores and command buffers
/// that ran together in a single batch.
pub struct SubmitBatch {
    pub wait_semaphores: Vec<(Arc<Semaphore>, vk::PipelineStageFlags)>,
    pub signal_semaphores: Vec<Arc<Semaphore>>,
    pub command_buffers: Vec<Arc<CommandBuffer>>,
}

impl SubmitBatch {
    pub fn new(command_buffers: Vec<Arc<CommandBuffer>>) -> Self {
        Self {
            wait_semaphores: Vec::new(),
            signal_semaphores: Vec::new(),
            command_buffers,
        }
    }
}

/// Which fence backs a pending submission: the application's own, borrowed for
/// the duration, or one taken from the device's pool. Never both (§4.5).
pub enum SubmissionFence {
    Borrowed(Arc<Fence>),
    Pooled(Arc<Fence>),
}

impl SubmissionFence {
    pub fn fence(&self) -> &Arc<Fence> {
        match self {
            SubmissionFence::Borrowed(f) => f,
            SubmissionFence::Pooled(f) => f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionState {
    Live,
    Retiring,
    Dropped,
}

/// Groups one or more `SubmitBatch`es that were handed to a single
/// `vkQueueSubmit` call. Stays alive until its fence is observed signaled.
pub struct PendingSubmission {
    id: u64,
    queue: vk::Queue,
    pub batches: Vec<SubmitBatch>,
    fence: SubmissionFence,
    state: Mutex<SubmissionState>,
}

impl PendingSubmission {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn fence(&self) -> &Arc<Fence> {
        self.fence.fence()
    }

    fn command_buffers(&self) -> impl Iterator<Item = &Arc<CommandBuffer>> {
        self.batches.iter().flat_map(|b| b.command_buffers.iter())
    }
}

/// Owns the device's queue-submit lock, pending-submission list, and the
/// fence/semaphore pools. Embedded in `Device`.
pub struct SubmissionTracker {
    queue_mutex: Mutex<()>,
    pending: Mutex<Vec<Arc<PendingSubmission>>>,
    fence_pool: FencePool,
    semaphore_pool: SemaphorePool,
}

impl Default for SubmissionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self {
            queue_mutex: Mutex::new(()),
            pending: Mutex::new(Vec::new()),
            fence_pool: FencePool::new(),
            semaphore_pool: SemaphorePool::new(),
        }
    }

    pub fn fence_pool(&self) -> &FencePool {
        &self.fence_pool
    }

    pub fn semaphore_pool(&self) -> &SemaphorePool {
        &self.semaphore_pool
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether the submission with this id is still pending retirement.
    /// `false` for an id that already retired or was never submitted.
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.lock().iter().any(|s| s.id() == id)
    }

    /// The five-step submit algorithm of `spec.md` §4.5. `app_fence` is the
    /// application-supplied fence, if any.
    pub fn submit(
        &self,
        driver: &dyn DriverDispatch,
        queue: vk::Queue,
        batches: Vec<SubmitBatch>,
        app_fence: Option<Arc<Fence>>,
    ) -> Result<Arc<PendingSubmission>> {
        // Step 1: serialize all submissions across queues.
        let _guard = self.queue_mutex.lock();

        // Step 4 (fence decision) is resolved before the driver call so the
        // handle is available to pass down; pool reuse sweeps `pending` first,
        // per the spec's explicit refill-on-reuse rule.
        let fence = match app_fence {
            Some(f) => SubmissionFence::Borrowed(f),
            None => {
                self.retire_signaled_locked(driver);
                let f = self
                    .fence_pool
                    .acquire(driver)
                    .map_err(Error::from)?;
                SubmissionFence::Pooled(f)
            }
        };

        // Step 2: allocate the PendingSubmission.
        let id = NEXT_SUBMISSION_ID.fetch_add(1, Ordering::Relaxed);
        let submission = Arc::new(PendingSubmission {
            id,
            queue,
            batches,
            fence,
            state: Mutex::new(SubmissionState::Live),
        });

        // Step 3: back-pointers and pending layouts.
        for cb in submission.command_buffers() {
            cb.push_pending(Arc::downgrade(&submission));
            for (image, final_layout) in cb.layout_changes() {
                image.set_pending_layout(final_layout);
            }
        }
        self.pending.lock().push(submission.clone());

        // Step 5: call through with the real batches, then release the queue
        // lock (via guard drop).
        let raw_batches: Vec<RawSubmitBatch> = submission
            .batches
            .iter()
            .map(|b| RawSubmitBatch {
                wait_semaphores: b.wait_semaphores.iter().map(|(s, stage)| (s.handle(), *stage)).collect(),
                signal_semaphores: b.signal_semaphores.iter().map(|s| s.handle()).collect(),
                command_buffers: b.command_buffers.iter().map(|cb| cb.handle()).collect(),
            })
            .collect();
        let result = driver.queue_submit(queue, &raw_batches, submission.fence().handle());
        if result != vk::Result::SUCCESS {
            return Err(Error::from(result).into());
        }

        Ok(submission)
    }

    /// Sweeps `pending`, retiring any submission whose fence is already
    /// signaled. Triggered by (a) a submit needing a pool fence, (b)
    /// `vkGetFenceStatus`, (c) `vkWaitForFences`, (d) GUI-driven sync.
    pub fn retire_signaled_locked(&self, driver: &dyn DriverDispatch) {
        let candidates: Vec<Arc<PendingSubmission>> = self.pending.lock().clone();
        for submission in candidates {
            let signaled = driver
                .get_fence_status(submission.fence().handle())
                .unwrap_or(false);
            if signaled {
                self.retire_one(driver, &submission);
            }
        }
    }

    fn retire_one(&self, driver: &dyn DriverDispatch, submission: &Arc<PendingSubmission>) {
        let mut state = submission.state.lock();
        if *state != SubmissionState::Live {
            return;
        }
        *state = SubmissionState::Retiring;
        drop(state);

        self.pending.lock().retain(|s| !Arc::ptr_eq(s, submission));
        for cb in submission.command_buffers() {
            cb.remove_pending(submission);
        }
        match &submission.fence {
            SubmissionFence::Borrowed(f) => f.detach(),
            SubmissionFence::Pooled(f) => {
                let _ = driver.reset_fences(&[f.handle()]);
                self.fence_pool.release(f.clone());
            }
        }
        *submission.state.lock() = SubmissionState::Dropped;
    }

    /// `vkDeviceWaitIdle`: drains every pending submission through the normal
    /// retirement path rather than bypassing it.
    pub fn wait_idle(&self, driver: &dyn DriverDispatch) -> Result<()> {
        loop {
            let fences: Vec<vk::Fence> = self
                .pending
                .lock()
                .iter()
                .map(|s| s.fence().handle())
                .collect();
            if fences.is_empty() {
                return Ok(());
            }
            let result = driver.wait_for_fences(&fences, true, u64::MAX);
            if result != vk::Result::SUCCESS {
                return Err(Error::from(result).into());
            }
            self.retire_signaled_locked(driver);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_buffer::CommandBuffer;
    use crate::config::LayerConfig;
    use crate::objects::command_pool::CommandPool;
    use crate::submission::driver::mock::MockDriver;

    fn new_command_buffer() -> Arc<CommandBuffer> {
        let pool = Arc::new(CommandPool::new(vk::CommandPool::null(), 0));
        Arc::new(CommandBuffer::new(
            vk::CommandBuffer::null(),
            Arc::downgrade(&pool),
            true,
        ))
    }

    #[test]
    fn submit_with_app_fence_attaches_and_retires() {
        let driver = MockDriver::new();
        let tracker = SubmissionTracker::new();
        let fence_handle = driver.create_fence(false).unwrap();
        let app_fence = Arc::new(Fence::new(fence_handle, false));
        let cb = new_command_buffer();
        cb.begin().unwrap();
        cb.end(&LayerConfig::default()).unwrap();

        let submission = tracker
            .submit(
                &driver,
                vk::Queue::null(),
                vec![SubmitBatch::new(vec![cb.clone()])],
                Some(app_fence.clone()),
            )
            .unwrap();
        assert_eq!(tracker.pending_count(), 1);
        assert!(cb.is_pending());

        driver.signal(fence_handle);
        tracker.retire_signaled_locked(&driver);

        assert_eq!(tracker.pending_count(), 0);
        assert!(!cb.is_pending());
        assert!(app_fence.attached_submission().is_none());
        let _ = submission.id();
    }

    #[test]
    fn submit_without_fence_uses_and_recycles_pool() {
        let driver = MockDriver::new();
        let tracker = SubmissionTracker::new();
        let cb = new_command_buffer();
        cb.begin().unwrap();
        cb.end(&LayerConfig::default()).unwrap();

        let submission = tracker
            .submit(
                &driver,
                vk::Queue::null(),
                vec![SubmitBatch::new(vec![cb])],
                None,
            )
            .unwrap();
        let pooled_handle = submission.fence().handle();
        driver.signal(pooled_handle);
        tracker.retire_signaled_locked(&driver);
        assert_eq!(tracker.fence_pool().free_count(), 1);
    }
}
