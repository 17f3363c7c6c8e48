//! Handle registry & dispatch (component A).
//!
//! Every layer-exported entry point looks up the shadow object for its first
//! argument, does layer bookkeeping, then calls through to the driver. Two
//! mechanisms back this, per `spec.md` §4.1:
//!
//! - [`dispatch_table`] — the process-wide table for *instance* and *device*
//!   handles, keyed by the loader-assigned dispatch key in the handle's first
//!   machine word. Queues and command buffers are also dispatchable, but a
//!   loader is free to stamp the same dispatch key into a device and every
//!   queue/command buffer retrieved from it, so registering those under their
//!   own dispatch key here would risk silently overwriting the owning
//!   device's entry in this table's single flat map. `loader`'s own
//!   handle-keyed routing table covers them instead (see its `routes`
//!   function).
//! - [`object_map`] — per-device, per-category maps for *non-dispatchable*
//!   handles (images, buffers, pipelines, …).

pub mod dispatch_table;
pub mod loader;
pub mod object_map;

pub use dispatch_table::{dispatch_table, DispatchTable};
pub use object_map::ObjectMap;
