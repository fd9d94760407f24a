//! # Task Control Block
//!
//! Defines the task model for DkOS: task identities, the per-task
//! descriptor and the fixed-size table that holds them.
//!
//! Slot 0 is reserved. Its identity is always [`TaskId::NULL`]; after
//! `start` it holds the saved context of the idle loop (the code that
//! called `start`), which runs whenever no real task is schedulable.

use core::fmt;

use crate::config::MAX_TASKS;

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// Identity of a task. Equal to the index of the slot it occupies.
/// `0` is the null identity and never names a real task.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    /// "No task": unused slots, free heap blocks, pre-start callers.
    pub const NULL: TaskId = TaskId(0);

    /// Identity of the task living in `slot`.
    #[inline]
    pub const fn from_slot(slot: usize) -> Self {
        TaskId(slot as u32)
    }

    /// Raw identity as it crosses the call gateway.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TaskId(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn slot(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///                create_task()
///   ┌──────────┐ ───────────►  ┌─────────┐   switch in   ┌─────────┐
///   │ Dormant  │               │  Ready  │ ────────────► │ Running │
///   └──────────┘ ◄──────────┐  └─────────┘ ◄──────────── └─────────┘
///                           │                switch out      │
///                           └────────────────────────────────┘
///                                      exit_current()
/// ```
///
/// `Sleeping` is reserved: nothing in the kernel enters or leaves it,
/// and the scheduler never selects a sleeping task.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Terminated or never used. The slot may be reused.
    Dormant = 0,
    /// Runnable, waiting to be switched in.
    Ready = 1,
    /// Executing on the CPU. At most one slot at a time.
    Running = 2,
    /// Reserved.
    Sleeping = 3,
}

/// Task entry point. Tasks never return; they leave through
/// `exit_current`.
pub type TaskEntry = extern "C" fn() -> !;

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// `#[repr(C)]` because callers hand one to the gateway by pointer on
/// `create_task` and `task_info`: the caller fills `entry` and
/// `stack_size`, the kernel fills everything else.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TaskControlBlock {
    /// Entry point, invoked when the task first runs.
    pub entry: Option<TaskEntry>,
    /// Highest address of the task's stack (initial top of stack).
    pub stack_high: usize,
    /// Identity; `TaskId::NULL` when the slot is unused.
    pub id: TaskId,
    pub state: TaskState,
    /// Stack size in bytes, a multiple of the word size.
    pub stack_size: u16,
    /// Saved stack pointer while the task is not running.
    pub stack_pointer: usize,
    /// Configured period in ms.
    pub deadline: u32,
    /// Countdown to the end of the current period, in ms.
    pub time_left: u32,
}

impl TaskControlBlock {
    /// An unused slot.
    pub const EMPTY: Self = Self {
        entry: None,
        stack_high: 0,
        id: TaskId::NULL,
        state: TaskState::Dormant,
        stack_size: 0,
        stack_pointer: 0,
        deadline: 0,
        time_left: 0,
    };

    /// A descriptor as a caller fills it before `create_task`.
    pub const fn new(entry: TaskEntry, stack_size: u16) -> Self {
        Self {
            entry: Some(entry),
            stack_size,
            ..Self::EMPTY
        }
    }

    /// Slot holds no task and may be claimed by `create_task`.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.id.is_null() || self.state == TaskState::Dormant
    }

    /// Eligible for selection by the scheduler.
    #[inline]
    pub fn is_schedulable(&self) -> bool {
        !self.id.is_null() && matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// Start a new period: `time_left` back to `deadline`.
    #[inline]
    pub fn reset_time_left(&mut self) {
        self.time_left = self.deadline;
    }
}

// ---------------------------------------------------------------------------
// Task table
// ---------------------------------------------------------------------------

/// Fixed-capacity table of task descriptors.
///
/// Alongside each descriptor the table remembers which heap block backs
/// the task's stack, so the kernel can hand it back to the allocator.
pub struct TaskTable {
    tasks: [TaskControlBlock; MAX_TASKS],
    stack_blocks: [Option<usize>; MAX_TASKS],
    /// Live tasks, counting the reserved slot 0.
    live: usize,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            stack_blocks: [None; MAX_TASKS],
            live: 1,
        }
    }

    /// First claimable slot in `1..MAX_TASKS`, never `busy`.
    pub fn free_slot(&self, busy: usize) -> Option<usize> {
        (1..MAX_TASKS).find(|&slot| slot != busy && self.tasks[slot].is_free())
    }

    /// Descriptor of a live task. `None` for out-of-range ids and
    /// unused slots.
    pub fn get(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.tasks.get(id.slot()).filter(|tcb| !tcb.id.is_null())
    }

    pub fn as_slice(&self) -> &[TaskControlBlock] {
        &self.tasks
    }

    /// Number of live tasks, including the reserved slot.
    pub fn live(&self) -> usize {
        self.live
    }

    pub(crate) fn slot(&self, slot: usize) -> &TaskControlBlock {
        &self.tasks[slot]
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> &mut TaskControlBlock {
        &mut self.tasks[slot]
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskControlBlock> {
        self.tasks.iter_mut()
    }

    /// Commit a fully built descriptor into `slot`.
    pub(crate) fn install(&mut self, slot: usize, tcb: TaskControlBlock, stack_block: usize) {
        self.tasks[slot] = tcb;
        self.stack_blocks[slot] = Some(stack_block);
        self.live += 1;
    }

    /// Mark `slot` dormant and clear its identity. Returns the heap block
    /// that backed its stack.
    pub(crate) fn retire(&mut self, slot: usize) -> Option<usize> {
        let tcb = &mut self.tasks[slot];
        tcb.state = TaskState::Dormant;
        tcb.id = TaskId::NULL;
        self.live -= 1;
        self.stack_blocks[slot].take()
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn spin() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn ready(slot: usize, time_left: u32) -> TaskControlBlock {
        TaskControlBlock {
            id: TaskId::from_slot(slot),
            state: TaskState::Ready,
            deadline: time_left,
            time_left,
            ..TaskControlBlock::new(spin, 0x200)
        }
    }

    #[test]
    fn test_empty_table() {
        let table = TaskTable::new();
        assert_eq!(table.live(), 1);
        assert_eq!(table.free_slot(0), Some(1));
        assert_eq!(table.free_slot(1), Some(2));
        assert!(table.get(TaskId::from_slot(1)).is_none());
        assert!(table.get(TaskId::from_slot(MAX_TASKS)).is_none());
    }

    #[test]
    fn test_install_and_retire() {
        let mut table = TaskTable::new();
        table.install(1, ready(1, 5), 0x40);
        assert_eq!(table.live(), 2);
        assert_eq!(table.free_slot(0), Some(2));
        assert_eq!(table.get(TaskId::from_slot(1)).map(|t| t.time_left), Some(5));

        assert_eq!(table.retire(1), Some(0x40));
        assert_eq!(table.live(), 1);
        assert_eq!(table.free_slot(0), Some(1));
        assert!(table.get(TaskId::from_slot(1)).is_none());
        assert_eq!(table.slot(1).state, TaskState::Dormant);
    }

    #[test]
    fn test_schedulable_states() {
        let mut tcb = ready(2, 3);
        assert!(tcb.is_schedulable());
        tcb.state = TaskState::Running;
        assert!(tcb.is_schedulable());
        tcb.state = TaskState::Sleeping;
        assert!(!tcb.is_schedulable());
        tcb.state = TaskState::Ready;
        tcb.id = TaskId::NULL;
        assert!(!tcb.is_schedulable());
        assert!(tcb.is_free());
    }

    #[test]
    fn test_reset_time_left() {
        let mut tcb = ready(1, 7);
        tcb.time_left = 1;
        tcb.reset_time_left();
        assert_eq!(tcb.time_left, 7);
    }
}
