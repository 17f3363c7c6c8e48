//! Command hook (component H, `spec.md` §4.8): re-records an instrumented
//! copy of a selected command for the next submission that includes it.
//!
//! Allocating the secondary command buffer, inserting timestamp/pipeline-
//! statistics queries, issuing the readback copies, and driving transform-
//! feedback capture are external collaborators this crate only talks to
//! through [`Instrumentation`] and [`HookResult`] (see the crate root docs).
//! This module owns the decision of *whether* a selection can be hooked
//! (gated on render-pass splittability, `crate::layout::is_splittable_at`),
//! the hook-target state machine, and the bounded result queue the GUI
//! drains. The other three state machines `spec.md` §4.8 names —
//! command buffer, pending submission, fence — already live on
//! [`crate::command::command_buffer::CommandBuffer`],
//! [`crate::submission::tracker::PendingSubmission`], and
//! [`crate::objects::fence::Fence`] respectively; this module composes with
//! them rather than duplicating them.
//!
//! `original_source/` has no dedicated hook translation unit — the upstream
//! project folds this logic into `cb.cpp`/`commands.cpp` rather than
//! isolating it — so this module is grounded directly on `spec.md` §4.8's
//! state-machine description, in the teacher's arena/weak-index and
//! `parking_lot`-guarded-state idiom.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::command::command_buffer::CommandBuffer;
use crate::command::node::NodeId;
use crate::error::{Error, Result};
use crate::layout::is_splittable_at;
use crate::objects::render_pass::RenderPassDescription;

/// What instrumentation to attach around the selected command
/// (`spec.md` §4.8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Instrumentation {
    pub timestamps: bool,
    pub pipeline_statistics: bool,
    pub readback: bool,
    pub transform_feedback: bool,
}

/// Identifies the node the GUI wants to inspect: which command buffer record
/// (by `reset_count`, so a `Reset`/`Begin` between selection and submit
/// invalidates it rather than silently hooking the wrong recording), which
/// node, and the subpass index the splittability check runs against.
#[derive(Debug, Clone, Copy)]
pub struct HookSelection {
    pub reset_count: u64,
    pub node: NodeId,
    pub subpass: usize,
    pub instrumentation: Instrumentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTargetState {
    Idle,
    Armed,
    Capturing,
    Completed,
}

/// Hook-target state machine: idle → armed (GUI select) → capturing (during
/// the hooked submit) → completed (results pushed) → armed (next GUI select,
/// which `spec.md` phrases as "next frame" since the GUI re-selects every
/// frame it keeps a command buffer pinned).
pub struct HookTarget {
    state: Mutex<HookTargetState>,
    selection: Mutex<Option<HookSelection>>,
}

impl Default for HookTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl HookTarget {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HookTargetState::Idle),
            selection: Mutex::new(None),
        }
    }

    pub fn state(&self) -> HookTargetState {
        *self.state.lock()
    }

    pub fn selection(&self) -> Option<HookSelection> {
        *self.selection.lock()
    }

    /// GUI selects a command to inspect. Valid from `Idle`, `Armed` (the GUI
    /// changed its mind before a submit picked the selection up) and
    /// `Completed`. Refused while `Capturing`: a submission is already
    /// mid-flight against the previous selection and re-arming now would race
    /// its retirement.
    pub fn select(&self, selection: HookSelection) -> Result<()> {
        let mut state = self.state.lock();
        if *state == HookTargetState::Capturing {
            return Err(Error::InvariantViolation("hook selection changed while a capture is in flight").into());
        }
        *self.selection.lock() = Some(selection);
        *state = HookTargetState::Armed;
        Ok(())
    }

    /// Clears the armed selection without capturing — used when the object
    /// graph notifies that the selected record (or the resource it names) was
    /// destroyed (`spec.md` §4.9's invalidation rule).
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if *state != HookTargetState::Capturing {
            *self.selection.lock() = None;
            *state = HookTargetState::Idle;
        }
    }

    /// Called by the submission path when it's about to substitute the
    /// hooked secondary in for the armed selection. Fails with
    /// [`Error::HookNotApplicable`] — and leaves the state `Armed` so the GUI
    /// can retry with a different target — when the selected subpass's render
    /// pass isn't splittable there.
    pub fn begin_capture(&self, description: &RenderPassDescription) -> Result<HookSelection> {
        let mut state = self.state.lock();
        if *state != HookTargetState::Armed {
            return Err(Error::InvariantViolation("begin_capture called without an armed selection").into());
        }
        let selection = match *self.selection.lock() {
            Some(s) => s,
            None => return Err(Error::InvariantViolation("armed state with no selection").into()),
        };
        if !is_splittable_at(description, selection.subpass) {
            return Err(Error::HookNotApplicable(selection.subpass as u32).into());
        }
        *state = HookTargetState::Capturing;
        Ok(selection)
    }

    /// The capture's submission retired and its readbacks are available.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        if *state == HookTargetState::Capturing {
            *state = HookTargetState::Completed;
        }
    }
}

/// The external collaborator this module hands a capture off to. Building the
/// instrumented secondary (timestamp/pipeline-statistics queries, readback
/// copies, transform-feedback capture) and mapping the results back once the
/// submission retires both need the renderer's own command recording and
/// memory access, which this crate doesn't have — it only decides whether and
/// when a capture happens.
pub trait HookExecutor: Send + Sync {
    /// Builds the secondary that replays `original`'s record up to and
    /// including `selection`'s node with the requested instrumentation,
    /// substituted in for `original` for this submit only.
    fn capture(&self, original: &Arc<CommandBuffer>, selection: HookSelection) -> Result<Arc<CommandBuffer>>;

    /// Reads back whatever the capture collected. Called once the submission
    /// that carried it has retired.
    fn read_back(&self, selection: HookSelection) -> HookResult;
}

/// One completed hook's captured data. Byte payloads are opaque here — the
/// renderer interprets them using the pipeline/format metadata it already has
/// from the object graph.
#[derive(Debug, Clone)]
pub struct HookResult {
    pub node: NodeId,
    pub reset_count: u64,
    pub timestamps_ns: Option<(u64, u64)>,
    pub pipeline_statistics: Option<Vec<u64>>,
    pub readback: Option<Vec<u8>>,
    pub transform_feedback: Option<Vec<u8>>,
}

/// Bounded single-producer/single-consumer result queue (`spec.md` §9:
/// "Coroutine-style control flow does not exist... the hook result queue is a
/// bounded single-producer/single-consumer structure"). The producer (a
/// submission's retirement sweep) never blocks: pushing past capacity drops
/// the oldest unread result rather than stalling retirement on a GUI that
/// isn't keeping up. The consumer (the GUI thread) can wait cooperatively,
/// polling a shutdown flag between timeouts per §5's cancellation rule.
pub struct ResultQueue {
    capacity: usize,
    inner: Mutex<VecDeque<HookResult>>,
    not_empty: Condvar,
}

impl ResultQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "a zero-capacity result queue can never hold a result");
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
        }
    }

    pub fn push(&self, result: HookResult) {
        let mut queue = self.inner.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(result);
        self.not_empty.notify_one();
    }

    pub fn try_pop(&self) -> Option<HookResult> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits up to `timeout` for a result, checking `shutdown` first so a
    /// consumer thread can unwind cooperatively rather than blocking forever
    /// on a queue nothing will ever push to again.
    pub fn pop_blocking(&self, timeout: std::time::Duration, shutdown: &std::sync::atomic::AtomicBool) -> Option<HookResult> {
        use std::sync::atomic::Ordering;
        let mut queue = self.inner.lock();
        if shutdown.load(Ordering::Relaxed) {
            return None;
        }
        if queue.is_empty() {
            self.not_empty.wait_for(&mut queue, timeout);
        }
        queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::render_pass::{AttachmentDescription, SubpassDescription};
    use std::sync::atomic::AtomicBool;

    fn splittable_description() -> RenderPassDescription {
        RenderPassDescription {
            attachments: vec![AttachmentDescription {
                format: ash::vk::Format::R8G8B8A8_UNORM,
                samples: ash::vk::SampleCountFlags::TYPE_1,
                load_op: ash::vk::AttachmentLoadOp::CLEAR,
                store_op: ash::vk::AttachmentStoreOp::STORE,
                initial_layout: ash::vk::ImageLayout::UNDEFINED,
                final_layout: ash::vk::ImageLayout::PRESENT_SRC_KHR,
            }],
            subpasses: vec![SubpassDescription {
                color_attachments: vec![0],
                ..Default::default()
            }],
        }
    }

    fn selection(subpass: usize) -> HookSelection {
        HookSelection {
            reset_count: 1,
            node: 7,
            subpass,
            instrumentation: Instrumentation { timestamps: true, ..Default::default() },
        }
    }

    #[test]
    fn select_arms_from_idle() {
        let target = HookTarget::new();
        assert_eq!(target.state(), HookTargetState::Idle);
        target.select(selection(0)).unwrap();
        assert_eq!(target.state(), HookTargetState::Armed);
        assert_eq!(target.selection().unwrap().node, 7);
    }

    #[test]
    fn begin_capture_succeeds_when_splittable_and_transitions_to_capturing() {
        let target = HookTarget::new();
        target.select(selection(0)).unwrap();
        let description = splittable_description();
        let picked = target.begin_capture(&description).unwrap();
        assert_eq!(picked.node, 7);
        assert_eq!(target.state(), HookTargetState::Capturing);
    }

    #[test]
    fn begin_capture_refuses_non_splittable_and_stays_armed() {
        let target = HookTarget::new();
        // single subpass that both writes a resolve attachment and reads the
        // same attachment as input is never splittable at subpass 0.
        let description = RenderPassDescription {
            attachments: vec![AttachmentDescription {
                format: ash::vk::Format::R8G8B8A8_UNORM,
                samples: ash::vk::SampleCountFlags::TYPE_4,
                load_op: ash::vk::AttachmentLoadOp::LOAD,
                store_op: ash::vk::AttachmentStoreOp::STORE,
                initial_layout: ash::vk::ImageLayout::UNDEFINED,
                final_layout: ash::vk::ImageLayout::PRESENT_SRC_KHR,
            }],
            subpasses: vec![SubpassDescription {
                input_attachments: vec![0],
                resolve_attachments: vec![0],
                ..Default::default()
            }],
        };
        target.select(selection(0)).unwrap();
        let err = target.begin_capture(&description).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::HookNotApplicable(0))));
        assert_eq!(target.state(), HookTargetState::Armed);
    }

    #[test]
    fn select_is_refused_mid_capture() {
        let target = HookTarget::new();
        target.select(selection(0)).unwrap();
        target.begin_capture(&splittable_description()).unwrap();
        assert!(target.select(selection(1)).is_err());
        assert_eq!(target.state(), HookTargetState::Capturing);
    }

    #[test]
    fn complete_then_reselect_rearms() {
        let target = HookTarget::new();
        target.select(selection(0)).unwrap();
        target.begin_capture(&splittable_description()).unwrap();
        target.complete();
        assert_eq!(target.state(), HookTargetState::Completed);
        target.select(selection(3)).unwrap();
        assert_eq!(target.state(), HookTargetState::Armed);
        assert_eq!(target.selection().unwrap().subpass, 3);
    }

    #[test]
    fn clear_during_capture_is_deferred() {
        let target = HookTarget::new();
        target.select(selection(0)).unwrap();
        target.begin_capture(&splittable_description()).unwrap();
        target.clear();
        assert_eq!(target.state(), HookTargetState::Capturing, "a destroy notification can't cancel a capture already in flight");
    }

    fn result(node: NodeId) -> HookResult {
        HookResult {
            node,
            reset_count: 1,
            timestamps_ns: Some((0, 1000)),
            pipeline_statistics: None,
            readback: None,
            transform_feedback: None,
        }
    }

    #[test]
    fn queue_is_fifo_within_capacity() {
        let queue = ResultQueue::new(4);
        queue.push(result(1));
        queue.push(result(2));
        assert_eq!(queue.try_pop().unwrap().node, 1);
        assert_eq!(queue.try_pop().unwrap().node, 2);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn queue_drops_oldest_past_capacity_without_blocking() {
        let queue = ResultQueue::new(2);
        queue.push(result(1));
        queue.push(result(2));
        queue.push(result(3));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop().unwrap().node, 2);
        assert_eq!(queue.try_pop().unwrap().node, 3);
    }

    #[test]
    fn pop_blocking_returns_none_once_shutdown() {
        let queue = ResultQueue::new(2);
        let shutdown = AtomicBool::new(true);
        assert!(queue.pop_blocking(std::time::Duration::from_millis(10), &shutdown).is_none());
    }

    #[test]
    fn pop_blocking_wakes_on_push() {
        use std::sync::Arc;
        use std::sync::atomic::Ordering;
        let queue = Arc::new(ResultQueue::new(2));
        let shutdown = Arc::new(AtomicBool::new(false));
        let producer_queue = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            producer_queue.push(result(42));
        });
        let got = queue.pop_blocking(std::time::Duration::from_secs(1), &shutdown);
        handle.join().unwrap();
        assert_eq!(got.unwrap().node, 42);
        assert!(!shutdown.load(Ordering::Relaxed));
    }
}
