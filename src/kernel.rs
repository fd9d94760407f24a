//! # Kernel
//!
//! The single kernel instance: task table, heap and switch coordinator,
//! plus every operation the call gateway exposes.
//!
//! `Kernel` is plain data with no interrupt masking of its own. On the
//! board there is exactly one, held by `arch::cortex_m4` behind a
//! `cortex_m::interrupt::Mutex`, and every method runs inside a critical
//! section. That covers the whole of each table or freelist mutation,
//! not only `set_deadline`.
//!
//! ## Startup Sequence
//!
//! ```text
//! main()
//!   ├─► init()          ← table reset, idle stack recorded
//!   ├─► mem_init()      ← heap claims its region
//!   ├─► create_task()   ← stack allocated + seeded (×N)
//!   └─► start()         ← slot 0 = idle, first selection, switch request
//!         └─► PendSV: switch() ──► first task runs
//! ```
//!
//! ## Stack Reclamation
//!
//! `exit_current` does not free the exiting task's stack on the spot:
//! the task is still executing on it until the pending switch happens.
//! The block is parked and released by `switch_context` once the
//! switch has moved off that stack.

use core::ptr::NonNull;

use crate::config::{DEFAULT_DEADLINE, MIN_STACK_SIZE, THREAD_STACK_SIZE, WORD_SIZE};
use crate::error::{HeapError, KernelError, Result};
use crate::memory::Heap;
use crate::scheduler;
use crate::stack;
use crate::switch::Coordinator;
use crate::task::{TaskControlBlock, TaskEntry, TaskId, TaskState, TaskTable};

/// Stack block of an exited task, waiting for the switch away from it.
#[derive(Debug, Clone, Copy)]
struct Reclaim {
    block: usize,
    owner: TaskId,
}

pub struct Kernel<'h> {
    tasks: TaskTable,
    heap: Heap<'h>,
    coordinator: Coordinator,
    reclaim: Option<Reclaim>,
    initialized: bool,
    started: bool,
}

impl<'h> Kernel<'h> {
    pub const fn new() -> Self {
        Self {
            tasks: TaskTable::new(),
            heap: Heap::new(),
            coordinator: Coordinator::new(),
            reclaim: None,
            initialized: false,
            started: false,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Reset the task table. `idle_stack_top` is the initial process
    /// stack pointer of the idle context (slot 0).
    pub fn init(&mut self, idle_stack_top: usize) -> Result<()> {
        if self.initialized {
            return Err(KernelError::AlreadyInitialized);
        }

        self.tasks = TaskTable::new();
        let idle = self.tasks.slot_mut(0);
        idle.stack_high = idle_stack_top;
        idle.stack_size = THREAD_STACK_SIZE;
        // Any real task is more urgent than idle.
        idle.deadline = u32::MAX;
        idle.time_left = u32::MAX;

        self.coordinator = Coordinator::new();
        self.initialized = true;
        log::debug!("kernel initialized, idle stack top {:#x}", idle_stack_top);
        Ok(())
    }

    /// Claim the heap region.
    pub fn mem_init(&mut self, region: &'h mut [u8]) -> Result<()> {
        Ok(self.heap.init(region)?)
    }

    /// Enter the idle context and schedule the first task. Returns the
    /// idle context's initial stack pointer; the trap layer moves thread
    /// mode onto it and then services the pending switch.
    pub fn start(&mut self) -> Result<usize> {
        if !self.initialized {
            return Err(KernelError::NotInitialized);
        }
        if self.started {
            return Err(KernelError::AlreadyStarted);
        }

        self.coordinator.enter_idle(&mut self.tasks);
        self.started = true;
        self.coordinator.reschedule(&self.tasks);
        log::debug!(
            "kernel started with {} task(s), first pick slot {}",
            self.tasks.live() - 1,
            self.coordinator.selected()
        );
        Ok(self.tasks.slot(0).stack_high)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    // -----------------------------------------------------------------------
    // Task table
    // -----------------------------------------------------------------------

    /// Register a task with a stack of `stack_size` bytes.
    pub fn create_task(&mut self, entry: Option<TaskEntry>, stack_size: u16) -> Result<TaskId> {
        if !self.initialized {
            return Err(KernelError::NotInitialized);
        }
        let entry = entry.ok_or(KernelError::MissingEntry)?;
        if stack_size < MIN_STACK_SIZE || usize::from(stack_size) % WORD_SIZE != 0 {
            return Err(KernelError::InvalidStackSize { size: stack_size });
        }
        // An exited task keeps its slot until the switch away from it.
        let slot = self
            .tasks
            .free_slot(self.coordinator.running())
            .ok_or(KernelError::TaskTableFull)?;
        let id = TaskId::from_slot(slot);

        let size = usize::from(stack_size);
        let block = self.heap.allocate(size, id)?;
        let Some(sp) = stack::seed(self.heap.payload_mut(block, size), entry as usize as u32) else {
            self.heap.deallocate(block, id)?;
            return Err(KernelError::InvalidStackSize { size: stack_size });
        };

        let base = self.heap.address_of(block);
        let top = base + sp + stack::FRAME_SIZE;
        let tcb = TaskControlBlock {
            entry: Some(entry),
            stack_high: top,
            id,
            state: TaskState::Ready,
            stack_size,
            stack_pointer: base + sp,
            deadline: DEFAULT_DEADLINE,
            time_left: DEFAULT_DEADLINE,
        };
        self.tasks.install(slot, tcb, block);
        log::debug!("task {} created, stack {:#x}..{:#x}", id, base, top);

        if self.started && self.more_urgent_than_running(slot) {
            self.coordinator.reschedule(&self.tasks);
        }
        Ok(id)
    }

    /// Copy of a live task's descriptor.
    pub fn task_info(&self, id: TaskId) -> Result<TaskControlBlock> {
        self.tasks.get(id).copied().ok_or(KernelError::InvalidTaskId(id))
    }

    /// Identity of the running task; null before `start` and while idle.
    pub fn current_tid(&self) -> TaskId {
        if !self.started {
            return TaskId::NULL;
        }
        self.tasks.slot(self.coordinator.running()).id
    }

    /// Give up the CPU. The caller starts a new period, so it does not
    /// win the reselection just because it was running.
    pub fn yield_current(&mut self) -> Result<()> {
        if !self.started {
            return Err(KernelError::NotStarted);
        }
        let running = self.coordinator.running();
        if running != 0 {
            self.tasks.slot_mut(running).reset_time_left();
        }
        self.coordinator.reschedule(&self.tasks);
        Ok(())
    }

    /// Terminate the running task. Its slot is immediately reusable; its
    /// stack goes back to the heap at the next switch.
    pub fn exit_current(&mut self) -> Result<()> {
        if !self.started {
            return Err(KernelError::NotStarted);
        }
        let running = self.coordinator.running();
        if running == 0 || self.tasks.slot(running).id.is_null() {
            return Err(KernelError::NoRunningTask);
        }

        let id = self.tasks.slot(running).id;
        if let Some(block) = self.tasks.retire(running) {
            self.reclaim = Some(Reclaim { block, owner: id });
        }
        log::debug!("task {} exited", id);

        self.coordinator.reschedule(&self.tasks);
        Ok(())
    }

    /// Give a READY task a new period length.
    pub fn set_deadline(&mut self, deadline: i32, id: TaskId) -> Result<()> {
        let Ok(value) = u32::try_from(deadline) else {
            return Err(KernelError::InvalidDeadline(deadline));
        };
        if value == 0 {
            return Err(KernelError::InvalidDeadline(deadline));
        }
        let slot = id.slot();
        if id.is_null() || slot >= self.tasks.as_slice().len() {
            return Err(KernelError::InvalidTaskId(id));
        }
        if self.started && slot == self.coordinator.running() {
            return Err(KernelError::TargetIsRunning(id));
        }
        let target = self.tasks.slot_mut(slot);
        if target.id != id || target.state != TaskState::Ready {
            return Err(KernelError::TaskNotReady(id));
        }

        target.deadline = value;
        target.time_left = value;

        if self.started && self.more_urgent_than_running(slot) {
            self.coordinator.reschedule(&self.tasks);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Heap
    // -----------------------------------------------------------------------

    /// Allocate `size` bytes owned by the running task. `None` on any
    /// failure.
    pub fn mem_alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let owner = self.current_tid();
        match self.heap.allocate(size, owner) {
            Ok(payload) => NonNull::new(self.heap.address_of(payload) as *mut u8),
            Err(e) => {
                log::debug!("alloc of {} bytes for task {} failed: {}", size, owner, e);
                None
            }
        }
    }

    /// Free a block owned by the running task. Freeing null succeeds.
    pub fn mem_dealloc(&mut self, ptr: *mut u8) -> Result<()> {
        if !self.heap.is_initialized() {
            return Err(HeapError::NotInitialized.into());
        }
        if ptr.is_null() {
            return Ok(());
        }
        let addr = ptr as usize;
        let payload = self
            .heap
            .offset_of(addr)
            .ok_or(HeapError::InvalidPointer { addr })?;
        let caller = self.current_tid();
        self.heap.deallocate(payload, caller).map_err(|e| {
            log::warn!("task {} free of {:#x} rejected: {}", caller, addr, e);
            e.into()
        })
    }

    /// Free blocks whose footprint is below `threshold` bytes.
    pub fn mem_count_extfrag(&self, threshold: usize) -> usize {
        self.heap.count_small_free_blocks(threshold)
    }

    pub fn heap(&self) -> &Heap<'h> {
        &self.heap
    }

    // -----------------------------------------------------------------------
    // Trap-layer hooks
    // -----------------------------------------------------------------------

    /// Periodic tick: count the running task down, and request a switch
    /// when it reaches zero or is no longer the most urgent.
    pub fn tick(&mut self) {
        if !self.started {
            return;
        }
        let running = self.coordinator.running();
        let reached_zero = scheduler::elapse(&mut self.tasks, running);
        let overtaken = self.coordinator.select(&self.tasks) != running;
        if reached_zero || overtaken {
            log::trace!("tick: slot {} reached_zero={} overtaken={}", running, reached_zero, overtaken);
            self.coordinator.reschedule(&self.tasks);
        }
    }

    /// Consume the pending switch request, if any.
    pub fn take_switch_request(&mut self) -> bool {
        self.coordinator.take_request()
    }

    pub fn switch_pending(&self) -> bool {
        self.coordinator.request().is_pending()
    }

    /// Bookkeeping for PendSV: save `outgoing_sp`, move to the selected
    /// task and return its stack pointer.
    pub fn switch_context(&mut self, outgoing_sp: usize) -> usize {
        let incoming_sp = self.coordinator.switch(&mut self.tasks, outgoing_sp);

        if let Some(Reclaim { block, owner }) = self.reclaim.take() {
            if let Err(e) = self.heap.deallocate(block, owner) {
                log::warn!("stack of exited task {} not reclaimed: {}", owner, e);
            }
        }
        incoming_sp
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    pub fn running_slot(&self) -> usize {
        self.coordinator.running()
    }

    pub fn selected_slot(&self) -> usize {
        self.coordinator.selected()
    }

    fn more_urgent_than_running(&self, slot: usize) -> bool {
        self.tasks.slot(slot).time_left < self.tasks.slot(self.coordinator.running()).time_left
    }
}

impl Default for Kernel<'_> {
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
    use crate::config::MAX_TASKS;
    use crate::memory::HEADER_SIZE;
    use crate::stack::{FRAME_SIZE, XPSR_THUMB};

    extern "C" fn task_a() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    const IDLE_TOP: usize = 0x2001_7C00;

    #[repr(align(8))]
    struct Arena([u8; 16 * 1024]);

    fn booted(arena: &mut Arena) -> Kernel<'_> {
        let mut kernel = Kernel::new();
        kernel.init(IDLE_TOP).unwrap();
        kernel.mem_init(&mut arena.0).unwrap();
        kernel
    }

    /// Service the pending switch the way PendSV would.
    fn pend_sv(kernel: &mut Kernel<'_>) {
        if kernel.take_switch_request() {
            let running = kernel.running_slot();
            let sp = kernel.tasks().slot(running).stack_pointer;
            kernel.switch_context(sp);
        }
    }

    #[test]
    fn test_init_twice_fails() {
        let mut kernel = Kernel::new();
        kernel.init(IDLE_TOP).unwrap();
        assert_eq!(kernel.init(IDLE_TOP), Err(KernelError::AlreadyInitialized));
    }

    #[test]
    fn test_create_before_init_fails() {
        let mut kernel = Kernel::new();
        assert_eq!(
            kernel.create_task(Some(task_a), 0x400),
            Err(KernelError::NotInitialized)
        );
    }

    #[test]
    fn test_create_task_fills_descriptor_and_stack() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let id = kernel.create_task(Some(task_a), 0x400).unwrap();
        assert_eq!(id, TaskId::from_slot(1));

        let tcb = kernel.task_info(id).unwrap();
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.deadline, DEFAULT_DEADLINE);
        assert_eq!(tcb.time_left, DEFAULT_DEADLINE);
        assert_eq!(tcb.stack_size, 0x400);
        assert_eq!(tcb.stack_pointer, tcb.stack_high - FRAME_SIZE);

        // xPSR is the last word below the top of stack.
        let top = tcb.stack_high;
        let xpsr = unsafe { core::ptr::read_unaligned((top - 4) as *const u32) };
        assert_eq!(xpsr, XPSR_THUMB);

        // Stack is a heap block owned by the new task.
        assert_eq!(
            kernel.heap().free_bytes(),
            kernel.heap().capacity() - 0x400 - HEADER_SIZE
        );
    }

    #[test]
    fn test_create_rejects_bad_stack() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        assert_eq!(
            kernel.create_task(Some(task_a), MIN_STACK_SIZE - 4),
            Err(KernelError::InvalidStackSize { size: MIN_STACK_SIZE - 4 })
        );
        assert_eq!(
            kernel.create_task(Some(task_a), MIN_STACK_SIZE + 2),
            Err(KernelError::InvalidStackSize { size: MIN_STACK_SIZE + 2 })
        );
        assert_eq!(kernel.create_task(None, 0x400), Err(KernelError::MissingEntry));
    }

    #[test]
    fn test_create_fails_without_memory_and_commits_nothing() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = Kernel::new();
        kernel.init(IDLE_TOP).unwrap();
        kernel.mem_init(&mut arena.0[..0x300]).unwrap();

        let err = kernel.create_task(Some(task_a), 0x400).unwrap_err();
        assert!(matches!(err, KernelError::Heap(HeapError::OutOfMemory { .. })));
        assert_eq!(kernel.tasks().live(), 1);
        assert_eq!(kernel.tasks().free_slot(0), Some(1));
    }

    #[test]
    fn test_table_capacity() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        for slot in 1..MAX_TASKS {
            assert_eq!(
                kernel.create_task(Some(task_a), MIN_STACK_SIZE),
                Ok(TaskId::from_slot(slot))
            );
        }
        let free_before = kernel.heap().free_bytes();
        assert!(free_before > 0x1000);
        assert_eq!(
            kernel.create_task(Some(task_a), MIN_STACK_SIZE),
            Err(KernelError::TaskTableFull)
        );
        assert_eq!(kernel.heap().free_bytes(), free_before);
    }

    #[test]
    fn test_current_tid_before_start_is_null() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        kernel.create_task(Some(task_a), 0x400).unwrap();
        assert_eq!(kernel.current_tid(), TaskId::NULL);
        assert_eq!(kernel.exit_current(), Err(KernelError::NotStarted));
        assert_eq!(kernel.yield_current(), Err(KernelError::NotStarted));
    }

    #[test]
    fn test_create_before_start_never_requests_switch() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        kernel.create_task(Some(task_a), 0x400).unwrap();
        assert!(!kernel.switch_pending());
    }

    #[test]
    fn test_start_runs_most_urgent() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        let b = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.set_deadline(3, b).unwrap();

        assert_eq!(kernel.start(), Ok(IDLE_TOP));
        assert_eq!(kernel.start(), Err(KernelError::AlreadyStarted));
        assert!(kernel.switch_pending());
        pend_sv(&mut kernel);

        assert_eq!(kernel.current_tid(), b);
        assert_eq!(kernel.task_info(b).unwrap().state, TaskState::Running);
        assert_eq!(kernel.task_info(a).unwrap().state, TaskState::Ready);
        assert_eq!(kernel.tasks().slot(0).stack_pointer, 0);
    }

    #[test]
    fn test_create_preempts_less_urgent_running_task() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.set_deadline(20, a).unwrap();
        kernel.start().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);

        let b = kernel.create_task(Some(task_a), 0x400).unwrap();
        assert!(kernel.switch_pending());
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), b);
    }

    #[test]
    fn test_exit_frees_slot_and_reclaims_stack_after_switch() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let initial = kernel.heap().capacity();
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.start().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);

        kernel.exit_current().unwrap();
        assert_eq!(kernel.current_tid(), TaskId::NULL);
        assert!(matches!(kernel.task_info(a), Err(KernelError::InvalidTaskId(id)) if id == a));
        assert_eq!(kernel.tasks().live(), 1);
        // Still on the exiting stack: not yet reclaimed.
        assert!(kernel.heap().free_bytes() < initial);

        pend_sv(&mut kernel);
        assert_eq!(kernel.running_slot(), 0);
        assert_eq!(kernel.heap().free_bytes(), initial);
        assert_eq!(kernel.exit_current(), Err(KernelError::NoRunningTask));
    }

    #[test]
    fn test_exited_slot_is_reused() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        let _b = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.start().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);

        kernel.exit_current().unwrap();
        pend_sv(&mut kernel);
        let c = kernel.create_task(Some(task_a), 0x400).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_set_deadline_guards() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        let b = kernel.create_task(Some(task_a), 0x400).unwrap();

        assert_eq!(kernel.set_deadline(0, b), Err(KernelError::InvalidDeadline(0)));
        assert_eq!(kernel.set_deadline(-4, b), Err(KernelError::InvalidDeadline(-4)));
        let far = TaskId::from_slot(MAX_TASKS);
        assert_eq!(kernel.set_deadline(3, far), Err(KernelError::InvalidTaskId(far)));
        let unused = TaskId::from_slot(7);
        assert_eq!(kernel.set_deadline(3, unused), Err(KernelError::TaskNotReady(unused)));

        kernel.start().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);
        assert_eq!(kernel.set_deadline(3, a), Err(KernelError::TargetIsRunning(a)));

        kernel.set_deadline(2, b).unwrap();
        let tcb = kernel.task_info(b).unwrap();
        assert_eq!((tcb.deadline, tcb.time_left), (2, 2));
        assert!(kernel.switch_pending());
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), b);
    }

    #[test]
    fn test_set_deadline_less_urgent_does_not_switch() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        let b = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.start().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);

        kernel.set_deadline(50, b).unwrap();
        assert!(!kernel.switch_pending());
    }

    #[test]
    fn test_yield_resets_time_left_and_ties_break_by_slot() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        let b = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.set_deadline(3, b).unwrap();
        kernel.set_deadline(3, a).unwrap();
        assert!(!kernel.is_started());
        kernel.start().unwrap();
        assert!(kernel.is_started());
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);

        kernel.tick();
        assert_eq!(kernel.task_info(a).unwrap().time_left, 2);
        assert_eq!(kernel.task_info(b).unwrap().time_left, 3);

        // Back at 3 after the yield: tied with b, the lower slot wins.
        kernel.yield_current().unwrap();
        assert_eq!(kernel.task_info(a).unwrap().time_left, 3);
        assert!(kernel.switch_pending());
        assert_eq!(kernel.selected_slot(), a.slot());
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);
        assert_eq!(kernel.task_info(b).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn test_tick_counts_down_running_task_only() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        let b = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.set_deadline(5, a).unwrap();
        kernel.set_deadline(9, b).unwrap();
        kernel.start().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);

        kernel.tick();
        assert_eq!(kernel.task_info(a).unwrap().time_left, 4);
        assert_eq!(kernel.task_info(b).unwrap().time_left, 9);
        assert!(!kernel.switch_pending());
    }

    #[test]
    fn test_tick_requests_switch_when_time_left_reaches_zero() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        let b = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.set_deadline(2, a).unwrap();
        kernel.set_deadline(4, b).unwrap();
        kernel.start().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);

        kernel.tick();
        assert!(!kernel.switch_pending());

        // a hits 0: a switch is requested, and a is still the most urgent.
        kernel.tick();
        assert_eq!(kernel.task_info(a).unwrap().time_left, 0);
        assert!(kernel.switch_pending());
        assert_eq!(kernel.selected_slot(), a.slot());
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);
        assert_eq!(kernel.task_info(b).unwrap().time_left, 4);

        // Saturated at 0: nothing more to report.
        kernel.tick();
        assert!(!kernel.switch_pending());
        assert_eq!(kernel.task_info(a).unwrap().time_left, 0);

        // Yield starts a new period at 2, still ahead of b.
        kernel.yield_current().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);
        assert_eq!(kernel.task_info(a).unwrap().time_left, 2);
    }

    #[test]
    fn test_heap_ownership_follows_running_task() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        let a = kernel.create_task(Some(task_a), 0x400).unwrap();
        let b = kernel.create_task(Some(task_a), 0x400).unwrap();
        kernel.set_deadline(9, b).unwrap();
        kernel.start().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);

        let p = kernel.mem_alloc(64).unwrap();
        kernel.yield_current().unwrap();
        // a restarts at 5, b is at 9: a keeps running. Make b win.
        kernel.set_deadline(1, b).unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), b);

        let err = kernel.mem_dealloc(p.as_ptr()).unwrap_err();
        assert!(matches!(err, KernelError::Heap(HeapError::WrongOwner { .. })));

        kernel.exit_current().unwrap();
        pend_sv(&mut kernel);
        assert_eq!(kernel.current_tid(), a);
        assert_eq!(kernel.mem_dealloc(p.as_ptr()), Ok(()));
    }

    #[test]
    fn test_mem_dealloc_null_and_foreign_pointers() {
        let mut arena = Arena([0; 16 * 1024]);
        let mut kernel = booted(&mut arena);
        assert_eq!(kernel.mem_dealloc(core::ptr::null_mut()), Ok(()));

        let mut outside = 0u32;
        let err = kernel
            .mem_dealloc(&mut outside as *mut u32 as *mut u8)
            .unwrap_err();
        assert!(matches!(err, KernelError::Heap(HeapError::InvalidPointer { .. })));
    }

    #[test]
    fn test_mem_alloc_before_heap_init() {
        let mut kernel = Kernel::new();
        kernel.init(IDLE_TOP).unwrap();
        assert!(kernel.mem_alloc(16).is_none());
        assert_eq!(
            kernel.mem_dealloc(core::ptr::null_mut()),
            Err(KernelError::Heap(HeapError::NotInitialized))
        );
    }
}
