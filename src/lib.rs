//! An in-process Vulkan interception layer: it shadows every handle the
//! application creates, records every command buffer it submits, and exposes
//! that state to a debug/introspection GUI that overlays the application's
//! swapchain.
//!
//! The layer loads into the application process at instance creation time and
//! intercepts every entry point the loader gives it. See the module docs below
//! for the pieces that make this up:
//!
//! - [`registry`] for the handle lookup tables (component A).
//! - [`objects`] for the shadow object graph (component B).
//! - [`command`] for the per-command-buffer recorder (components C and D).
//! - [`submission`] for the `vkQueueSubmit` interception and fence/semaphore
//!   pooling (component E).
//! - [`layout`] for pending image-layout tracking and render-pass splittability
//!   (component F).
//! - [`matcher`] for the lazy-matrix-march command tree matcher (component G).
//! - [`hook`] for re-recording an instrumented copy of a submission (component H).
//! - [`gui`] for the read-only surface the (external) renderer consumes, and the
//!   public C ABI a host application uses to drive the overlay.
//!
//! The Dear-ImGui-style renderer, the windowing backend, SPIR-V
//! parsing/patching, per-format byte tables and transform-feedback capture are
//! external collaborators this crate only talks to through narrow interfaces; it
//! does not implement them.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod command;
pub mod config;
pub mod error;
pub mod gui;
pub mod hook;
pub mod layout;
pub mod matcher;
pub mod objects;
pub mod registry;
pub mod submission;
pub mod util;

pub use error::{Error, Result};
