//! # Call Gateway
//!
//! Opcode-indexed entry into the kernel. User code issues `svc #n` with
//! arguments in R0–R3 (see `syscall`); the SVCall handler decodes the
//! stacked registers into a [`Call`], runs [`dispatch`] and writes the
//! returned word back into the caller's R0.
//!
//! ## Opcodes
//!
//! | # | Operation | R0 | R1 | Result |
//! |---|-----------|----|----|--------|
//! | 0 | kernel init | | | `RTX_OK` / `RTX_ERR` |
//! | 1 | create task | `*mut TaskControlBlock` | | `RTX_OK` / `RTX_ERR` |
//! | 2 | kernel start | | | `RTX_ERR` (does not return on success) |
//! | 3 | yield | | | `RTX_OK` / `RTX_ERR` |
//! | 4 | task info | id | `*mut TaskControlBlock` | `RTX_OK` / `RTX_ERR` |
//! | 5 | get TID | | | id, `0` if none |
//! | 6 | task exit | | | `RTX_ERR` (does not return on success) |
//! | 7 | heap init | | | `RTX_OK` / `RTX_ERR` |
//! | 8 | allocate | size | | pointer, null on failure |
//! | 9 | deallocate | pointer | | `RTX_OK` / `RTX_ERR` |
//! | 10 | count small free blocks | threshold | | count |
//! | 13 | set deadline | deadline | id | `RTX_OK` / `RTX_ERR` |
//!
//! The numbering is a stable contract with existing callers; 11 and 12
//! are unassigned.

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::task::{TaskControlBlock, TaskId};

pub const RTX_OK: usize = 0;
pub const RTX_ERR: usize = 1;

/// Gateway opcodes, as encoded in the `svc` immediate.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    KernelInit = 0,
    CreateTask = 1,
    KernelStart = 2,
    Yield = 3,
    TaskInfo = 4,
    GetTid = 5,
    TaskExit = 6,
    MemInit = 7,
    MemAlloc = 8,
    MemDealloc = 9,
    MemCountExtfrag = 10,
    SetDeadline = 13,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        Ok(match raw {
            0 => Self::KernelInit,
            1 => Self::CreateTask,
            2 => Self::KernelStart,
            3 => Self::Yield,
            4 => Self::TaskInfo,
            5 => Self::GetTid,
            6 => Self::TaskExit,
            7 => Self::MemInit,
            8 => Self::MemAlloc,
            9 => Self::MemDealloc,
            10 => Self::MemCountExtfrag,
            13 => Self::SetDeadline,
            other => return Err(other),
        })
    }
}

/// A decoded gateway call. Pointers from the caller are already turned
/// into references (or `None` for null).
#[derive(Debug)]
pub enum Call<'a> {
    KernelInit,
    CreateTask(Option<&'a mut TaskControlBlock>),
    KernelStart,
    Yield,
    TaskInfo {
        id: TaskId,
        out: Option<&'a mut TaskControlBlock>,
    },
    GetTid,
    TaskExit,
    MemInit,
    MemAlloc(usize),
    MemDealloc(*mut u8),
    MemCountExtfrag(usize),
    SetDeadline {
        deadline: i32,
        id: TaskId,
    },
}

impl Call<'_> {
    /// Decode an opcode and the caller's R0–R1.
    ///
    /// # Safety
    /// Non-null pointer arguments of `CreateTask` and `TaskInfo` must
    /// point to a writable `TaskControlBlock` for the duration of the
    /// call.
    pub unsafe fn decode(opcode: Opcode, r0: usize, r1: usize) -> Self {
        match opcode {
            Opcode::KernelInit => Call::KernelInit,
            Opcode::CreateTask => Call::CreateTask((r0 as *mut TaskControlBlock).as_mut()),
            Opcode::KernelStart => Call::KernelStart,
            Opcode::Yield => Call::Yield,
            Opcode::TaskInfo => Call::TaskInfo {
                id: TaskId::from_raw(r0 as u32),
                out: (r1 as *mut TaskControlBlock).as_mut(),
            },
            Opcode::GetTid => Call::GetTid,
            Opcode::TaskExit => Call::TaskExit,
            Opcode::MemInit => Call::MemInit,
            Opcode::MemAlloc => Call::MemAlloc(r0),
            Opcode::MemDealloc => Call::MemDealloc(r0 as *mut u8),
            Opcode::MemCountExtfrag => Call::MemCountExtfrag(r0),
            Opcode::SetDeadline => Call::SetDeadline {
                deadline: r0 as u32 as i32,
                id: TaskId::from_raw(r1 as u32),
            },
        }
    }
}

/// Link-time facts the kernel needs but does not compute, and the one
/// hardware action the gateway cannot express as bookkeeping.
pub trait Platform<'h> {
    /// Initial process stack pointer of the idle context.
    fn idle_stack_top(&self) -> usize;

    /// Hand over the heap region. Yields the region at most once.
    fn claim_heap_region(&mut self) -> Option<&'h mut [u8]>;

    /// Called after a successful kernel start with the idle context's
    /// stack pointer: move thread mode onto it and start the tick.
    fn launch(&mut self, idle_sp: usize);
}

/// Run one gateway call against `kernel`. Returns the word for R0.
pub fn dispatch<'h>(kernel: &mut Kernel<'h>, platform: &mut dyn Platform<'h>, call: Call<'_>) -> usize {
    match call {
        Call::KernelInit => status(kernel.init(platform.idle_stack_top())),
        Call::CreateTask(tcb) => {
            let Some(tcb) = tcb else {
                return RTX_ERR;
            };
            match kernel.create_task(tcb.entry, tcb.stack_size) {
                Ok(id) => {
                    if let Ok(created) = kernel.task_info(id) {
                        *tcb = created;
                    }
                    RTX_OK
                }
                Err(e) => {
                    log::debug!("create_task rejected: {}", e);
                    RTX_ERR
                }
            }
        }
        Call::KernelStart => match kernel.start() {
            Ok(idle_sp) => {
                platform.launch(idle_sp);
                RTX_OK
            }
            Err(_) => RTX_ERR,
        },
        Call::Yield => status(kernel.yield_current()),
        Call::TaskInfo { id, out } => {
            let Some(out) = out else {
                return RTX_ERR;
            };
            match kernel.task_info(id) {
                Ok(tcb) => {
                    *out = tcb;
                    RTX_OK
                }
                Err(_) => RTX_ERR,
            }
        }
        Call::GetTid => kernel.current_tid().as_raw() as usize,
        Call::TaskExit => status(kernel.exit_current()),
        Call::MemInit => {
            if kernel.heap().is_initialized() {
                return RTX_ERR;
            }
            match platform.claim_heap_region() {
                Some(region) => status(kernel.mem_init(region)),
                None => RTX_ERR,
            }
        }
        Call::MemAlloc(size) => kernel.mem_alloc(size).map_or(0, |p| p.as_ptr() as usize),
        Call::MemDealloc(p) => status(kernel.mem_dealloc(p)),
        Call::MemCountExtfrag(threshold) => kernel.mem_count_extfrag(threshold),
        Call::SetDeadline { deadline, id } => status(kernel.set_deadline(deadline, id)),
    }
}

fn status(result: Result<(), KernelError>) -> usize {
    match result {
        Ok(()) => RTX_OK,
        Err(_) => RTX_ERR,
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
