//! # User-Side Call Stubs
//!
//! One function per gateway opcode. Each issues `svc #n` with its
//! arguments in R0/R1 and reads the result back from R0; see the table
//! in [`crate::gateway`].

use core::arch::asm;
use core::ptr::NonNull;

use crate::gateway::{Opcode, RTX_OK};
use crate::task::{TaskControlBlock, TaskId};

/// The kernel refused a call. The reason is logged on the kernel side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("kernel rejected the call")]
pub struct Rejected;

macro_rules! svc {
    ($op:expr, $r0:expr, $r1:expr) => {{
        let r0: usize = $r0;
        let r1: usize = $r1;
        let result: usize;
        unsafe {
            asm!(
                "svc #{op}",
                op = const $op as u8,
                inout("r0") r0 => result,
                in("r1") r1,
                options(nostack),
            );
        }
        result
    }};
}

fn status(word: usize) -> Result<(), Rejected> {
    if word == RTX_OK {
        Ok(())
    } else {
        Err(Rejected)
    }
}

/// Reset the task table. Run once, from `main`, before anything else.
pub fn kernel_init() -> Result<(), Rejected> {
    status(svc!(Opcode::KernelInit, 0, 0))
}

/// Hand the free RAM between the image and the stacks to the heap.
pub fn mem_init() -> Result<(), Rejected> {
    status(svc!(Opcode::MemInit, 0, 0))
}

/// Create a task from `tcb.entry` and `tcb.stack_size`. On success the
/// kernel has filled in the rest of `tcb`.
pub fn create_task(tcb: &mut TaskControlBlock) -> Result<TaskId, Rejected> {
    status(svc!(Opcode::CreateTask, tcb as *mut TaskControlBlock as usize, 0))?;
    Ok(tcb.id)
}

/// Start scheduling. On success the caller continues as the idle
/// context, running only when no task is ready.
pub fn kernel_start() -> Result<(), Rejected> {
    status(svc!(Opcode::KernelStart, 0, 0))
}

/// Give up the CPU and start a new period.
pub fn yield_now() {
    svc!(Opcode::Yield, 0, 0);
}

pub fn task_info(id: TaskId) -> Result<TaskControlBlock, Rejected> {
    let mut tcb = TaskControlBlock::EMPTY;
    let out = &mut tcb as *mut TaskControlBlock as usize;
    status(svc!(Opcode::TaskInfo, id.as_raw() as usize, out))?;
    Ok(tcb)
}

/// Identity of the caller; null from the idle context.
pub fn current_tid() -> TaskId {
    TaskId::from_raw(svc!(Opcode::GetTid, 0, 0) as u32)
}

/// Terminate the calling task. Returns only if the caller is not a task.
pub fn task_exit() -> Rejected {
    svc!(Opcode::TaskExit, 0, 0);
    Rejected
}

/// Allocate `size` bytes owned by the caller.
pub fn mem_alloc(size: usize) -> Option<NonNull<u8>> {
    NonNull::new(svc!(Opcode::MemAlloc, size, 0) as *mut u8)
}

/// Free a block the caller owns. Freeing null is a no-op.
pub fn mem_dealloc(block: *mut u8) -> Result<(), Rejected> {
    status(svc!(Opcode::MemDealloc, block as usize, 0))
}

/// Free blocks whose footprint (header included) is below `threshold`.
pub fn mem_count_extfrag(threshold: usize) -> usize {
    svc!(Opcode::MemCountExtfrag, threshold, 0)
}

/// Give the READY task `id` a period of `deadline` ms.
pub fn set_deadline(deadline: i32, id: TaskId) -> Result<(), Rejected> {
    status(svc!(Opcode::SetDeadline, deadline as u32 as usize, id.as_raw() as usize))
}
