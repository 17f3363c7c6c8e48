//! Command buffer recording, the resource-use tracker, and the typed command
//! tree (`spec.md` §4.3, §4.4 — components C and D).

pub mod command_buffer;
pub mod node;
pub mod record;
pub mod resource_use;
pub mod state;

pub use command_buffer::{CbState, CommandBuffer};
pub use node::{Command, Node, NodeId};
pub use record::CommandRecord;
