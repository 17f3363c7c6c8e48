//! Fence and semaphore pools (`spec.md` §4.5).
//!
//! The device keeps a vector of currently-unused fences and two vectors for
//! semaphores (in-use, awaiting reset). Plain `Vec`s rather than a generic
//! object-pool abstraction, matching the literal data model in §3/§4.5.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::objects::fence::Fence;
use crate::objects::semaphore::{Semaphore, SemaphoreState};
use crate::submission::driver::DriverDispatch;

#[derive(Default)]
pub struct FencePool {
    free: Mutex<Vec<Arc<Fence>>>,
}

impl FencePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a fence from the pool, creating one if it's empty.
    pub fn acquire(&self, driver: &dyn DriverDispatch) -> Result<Arc<Fence>, ash::vk::Result> {
        if let Some(fence) = self.free.lock().pop() {
            return Ok(fence);
        }
        let handle = driver.create_fence(false)?;
        Ok(Arc::new(Fence::new(handle, true)))
    }

    /// Return a fence to the pool after resetting it and detaching it from any
    /// submission.
    pub fn release(&self, fence: Arc<Fence>) {
        fence.detach();
        self.free.lock().push(fence);
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }
}

#[derive(Default)]
pub struct SemaphorePool {
    in_use: Mutex<Vec<Arc<Semaphore>>>,
    awaiting_reset: Mutex<Vec<Arc<Semaphore>>>,
}

impl SemaphorePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a semaphore to chain the layer's own work after application work,
    /// recycling one that's awaiting reset if available.
    pub fn acquire(&self, driver: &dyn DriverDispatch) -> Result<Arc<Semaphore>, ash::vk::Result> {
        if let Some(sem) = self.awaiting_reset.lock().pop() {
            sem.mark_in_use();
            self.in_use.lock().push(sem.clone());
            return Ok(sem);
        }
        let handle = driver.create_semaphore()?;
        let sem = Arc::new(Semaphore::new(handle, true));
        self.in_use.lock().push(sem.clone());
        Ok(sem)
    }

    /// Move a semaphore from in-use into awaiting-reset once its submission
    /// retires.
    pub fn release(&self, sem: Arc<Semaphore>) {
        self.in_use.lock().retain(|s| !Arc::ptr_eq(s, &sem));
        sem.mark_awaiting_reset();
        self.awaiting_reset.lock().push(sem);
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.lock().len()
    }

    pub fn awaiting_reset_count(&self) -> usize {
        self.awaiting_reset
            .lock()
            .iter()
            .filter(|s| s.state() == SemaphoreState::AwaitingReset)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::driver::mock::MockDriver;

    #[test]
    fn fence_pool_reuses_released_fences() {
        let driver = MockDriver::new();
        let pool = FencePool::new();
        let fence = pool.acquire(&driver).unwrap();
        let raw_handle = fence.handle();
        pool.release(fence);
        assert_eq!(pool.free_count(), 1);
        let reused = pool.acquire(&driver).unwrap();
        assert_eq!(reused.handle(), raw_handle);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn semaphore_pool_cycles_in_use_to_awaiting_reset() {
        let driver = MockDriver::new();
        let pool = SemaphorePool::new();
        let sem = pool.acquire(&driver).unwrap();
        assert_eq!(pool.in_use_count(), 1);
        pool.release(sem);
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.awaiting_reset_count(), 1);
    }
}
