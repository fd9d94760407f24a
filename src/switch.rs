//! # Context-Switch Coordinator
//!
//! The bookkeeping half of a context switch. The register half lives in
//! the PendSV handler (`arch::cortex_m4`), which saves R4–R11 on the
//! outgoing process stack, calls into here with that stack pointer, and
//! restores R4–R11 from whatever stack pointer comes back.
//!
//! ## Sequence
//!
//! ```text
//!   kernel op ──► scheduler::select() ──► Coordinator::select()
//!                                             │
//!                                             ▼
//!                                     SwitchRequest::raise()
//!                                             │   (trap layer pends PendSV)
//!                                             ▼
//!   PendSV ──► Coordinator::switch(outgoing sp) ──► incoming sp
//! ```
//!
//! Selection always happens before the request is raised, and `switch`
//! updates both descriptors and the running slot before returning.

use crate::scheduler;
use crate::task::{TaskState, TaskTable};

/// Pending request for the trap layer to switch contexts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwitchRequest(bool);

impl SwitchRequest {
    pub const fn new() -> Self {
        SwitchRequest(false)
    }

    #[inline]
    pub fn raise(&mut self) {
        self.0 = true;
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.0
    }

    /// Consume the request. Returns whether one was pending.
    #[inline]
    pub fn take(&mut self) -> bool {
        core::mem::replace(&mut self.0, false)
    }
}

/// Tracks which slot is running and which one the scheduler picked.
#[derive(Debug)]
pub struct Coordinator {
    running: usize,
    selected: usize,
    request: SwitchRequest,
}

impl Coordinator {
    pub const fn new() -> Self {
        Self {
            running: 0,
            selected: 0,
            request: SwitchRequest::new(),
        }
    }

    /// Slot currently executing. Slot 0 is the idle context.
    pub fn running(&self) -> usize {
        self.running
    }

    /// Slot the next switch will move to.
    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn request(&self) -> SwitchRequest {
        self.request
    }

    pub fn take_request(&mut self) -> bool {
        self.request.take()
    }

    /// Run the scheduler and remember its choice. With nothing
    /// schedulable, the idle context (slot 0) is chosen.
    pub fn select(&mut self, tasks: &TaskTable) -> usize {
        self.selected = scheduler::select(tasks.as_slice()).unwrap_or(0);
        self.selected
    }

    /// Select, then ask the trap layer for a switch.
    pub fn reschedule(&mut self, tasks: &TaskTable) {
        self.select(tasks);
        self.request.raise();
    }

    /// Make slot 0 the running context. Used once, by `start`.
    pub(crate) fn enter_idle(&mut self, tasks: &mut TaskTable) {
        self.running = 0;
        tasks.slot_mut(0).state = TaskState::Running;
    }

    /// Switch from the running slot to the selected slot.
    ///
    /// `outgoing_sp` is the running task's stack pointer after the trap
    /// layer pushed its software-saved registers. Returns the stack
    /// pointer to restore.
    pub fn switch(&mut self, tasks: &mut TaskTable, outgoing_sp: usize) -> usize {
        let from = self.running;
        let to = self.selected;

        let outgoing = tasks.slot_mut(from);
        outgoing.stack_pointer = outgoing_sp;
        if outgoing.state != TaskState::Dormant {
            outgoing.state = TaskState::Ready;
        }

        let incoming = tasks.slot_mut(to);
        incoming.state = TaskState::Running;
        let incoming_sp = incoming.stack_pointer;

        self.running = to;
        log::trace!("switch: slot {} -> slot {}", from, to);
        incoming_sp
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
