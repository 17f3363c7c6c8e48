//! Shadow for `VkFence`.
//!
//! Tracks the fence state machine of `spec.md` §4.8: free → in-use (attached to a
//! submission) → signaled → reset → free. Layer-owned (pool) fences cycle through
//! all four states; application-supplied fences are only ever attached/detached,
//! never pooled.

use std::sync::{Arc, Weak};

use ash::vk;
use parking_lot::Mutex;

use crate::objects::handle::{HandleMeta, Nameable};
use crate::submission::tracker::PendingSubmission;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Fence {
    meta: HandleMeta,
    #[derivative(Debug = "ignore")]
    handle: vk::Fence,
    /// `true` if this fence lives in the device's fence pool rather than being
    /// application-owned.
    pub layer_owned: bool,
    #[derivative(Debug = "ignore")]
    attached_submission: Mutex<Option<Weak<PendingSubmission>>>,
}

impl Fence {
    pub fn new(handle: vk::Fence, layer_owned: bool) -> Self {
        Self {
            meta: HandleMeta::new(),
            handle,
            layer_owned,
            attached_submission: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    pub fn attach(&self, submission: &Arc<PendingSubmission>) {
        *self.attached_submission.lock() = Some(Arc::downgrade(submission));
    }

    /// Clear the link to a retired submission. After this, `attached_submission`
    /// is `None`, matching scenario E2's expectation that a borrowed fence's
    /// submission pointer is null once its submission has been waited on.
    pub fn detach(&self) {
        *self.attached_submission.lock() = None;
    }

    pub fn attached_submission(&self) -> Option<Arc<PendingSubmission>> {
        self.attached_submission.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl Nameable for Fence {
    fn meta(&self) -> &HandleMeta {
        &self.meta
    }
}
