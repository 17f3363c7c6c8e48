//! Submission tracker (component E): intercepts `vkQueueSubmit`, associates
//! command records with pending fences, and reclaims resources when a
//! submission completes.

pub mod driver;
pub mod pools;
pub mod tracker;

pub use driver::DriverDispatch;
pub use pools::{FencePool, SemaphorePool};
pub use tracker::{PendingSubmission, SubmitBatch};
