//! Shadow for `VkSemaphore`.
//!
//! Layer-pool semaphores are used when the layer needs to chain its own work
//! (e.g. a hook re-recording) after application work (`spec.md` §4.5). They carry
//! a simple in-use/awaiting-reset flag the pool uses to decide when recycling is
//! safe.

use ash::vk;
use parking_lot::Mutex;

use crate::objects::handle::{HandleMeta, Nameable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreState {
    InUse,
    AwaitingReset,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Semaphore {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Semaphore,
    pub layer_owned: bool,
    state: Mutex<SemaphoreState>,
}

impl Semaphore {
    pub fn new(handle: vk::Semaphore, layer_owned: bool) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            layer_owned,
            state: Mutex::new(SemaphoreState::InUse),
        }
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    pub fn state(&self) -> SemaphoreState {
        *self.state.lock()
    }

    pub fn mark_awaiting_reset(&self) {
        *self.state.lock() = SemaphoreState::AwaitingReset;
    }

    pub fn mark_in_use(&self) {
        *self.state.lock() = SemaphoreState::InUse;
    }
}

impl Nameable for Semaphore {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
