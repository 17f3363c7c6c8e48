//! Error types used throughout the layer.
//!
//! Vulkan errors are propagated verbatim (see [`Error::VkError`]); layer-internal
//! invariant violations get their own variants so callers can decide whether to
//! log-and-degrade or trap, per the failure semantics of the object graph and
//! command hook.

use ash::vk;
use thiserror::Error as ThisError;

/// Top level error type for the layer.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A call into the driver returned a non-success `VkResult`. Propagated unchanged;
    /// callers must roll back any bookkeeping performed before this point.
    #[error("driver call failed: {0:?}")]
    VkError(vk::Result),
    /// Allocating a shadow object failed. Reported to the application as
    /// `VK_ERROR_OUT_OF_HOST_MEMORY`.
    #[error("layer ran out of host memory allocating a shadow object")]
    OutOfHostMemory,
    /// A lookup that should have succeeded (an externally-synchronized handle the
    /// application is required to keep valid) did not find a shadow object.
    #[error("no shadow object registered for handle in {0}")]
    HandleNotFound(&'static str),
    /// The application broke an externally-synchronized contract (e.g. destroying a
    /// resource while a pending submission still references it, rebinding memory).
    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),
    /// The selected command could not be hooked because its render pass is not
    /// splittable at the target subpass. Never raised through the C ABI; surfaced to
    /// the GUI as a structured value instead.
    #[error("cannot hook selected command: render pass not splittable at subpass {0}")]
    HookNotApplicable(u32),
    /// Two command records could not be compared because their shapes are
    /// fundamentally different (mismatched root command counts and no partial path).
    #[error("uncategorized layer error: {0}")]
    Uncategorized(&'static str),
}

impl From<vk::Result> for Error {
    fn from(value: vk::Result) -> Self {
        Error::VkError(value)
    }
}

pub type Result<T> = anyhow::Result<T>;

/// Maps a layer error onto the `VkResult` the layer must hand back to the
/// application from an entry point, per §7's error handling design.
pub fn to_vk_result(err: &anyhow::Error) -> vk::Result {
    if let Some(Error::VkError(res)) = err.downcast_ref::<Error>() {
        return *res;
    }
    if let Some(Error::OutOfHostMemory) = err.downcast_ref::<Error>() {
        return vk::Result::ERROR_OUT_OF_HOST_MEMORY;
    }
    vk::Result::ERROR_UNKNOWN
}
