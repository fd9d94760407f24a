//! # DkOS — Deadline Kernel OS
//!
//! A small preemptive real-time kernel for ARM Cortex-M4 microcontrollers:
//! least-time-left scheduling over a fixed task table, and a first-fit
//! heap that also provides every task's stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │            Application Tasks (syscall.rs)               │
//! │           svc #0 … svc #13, arguments in R0/R1          │
//! ├────────────────────────────────────────────────────────┤
//! │               Call Gateway (gateway.rs)                 │
//! │          Opcode · Call · dispatch() · Platform          │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel (kernel.rs)                      │
//! │  init · create_task · start · yield · exit · deadline   │
//! │  mem_init · mem_alloc · mem_dealloc · mem_count_extfrag │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │  Scheduler   │   Switch         │   Heap               │
//! │  scheduler.rs│   switch.rs      │   memory.rs          │
//! │  ─ select()  │   ─ Coordinator  │   ─ first fit        │
//! │  ─ elapse()  │   ─ SwitchRequest│   ─ coalescing free  │
//! ├──────────────┴──────────────────┴──────────────────────┤
//! │     Task Model (task.rs) · Initial Frame (stack.rs)     │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │          SVCall · PendSV · SysTick · board layout       │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! Each task has a `deadline` (its period, in ticks of 1 ms) and a
//! `time_left` countdown. The task with the least time left runs; ties go
//! to the lowest slot. Only the running task counts down, one unit per
//! tick; the countdown restarts on creation, on yield and on a deadline
//! change.
//!
//! Switches are requested, never performed inline: kernel operations
//! leave a [`switch::SwitchRequest`], the trap layer turns it into a
//! PendSV, and PendSV performs the stack swap.
//!
//! ## Memory Model
//!
//! - **Fixed task table**: `[TaskControlBlock; MAX_TASKS]`, slot 0 reserved
//! - **One heap**: headers embedded in the managed region, address-ordered
//!   freelist, adjacent free blocks always merged
//! - **Stacks from the heap**: each task's stack is a block it owns; the
//!   block returns to the heap after the task exits
//! - **Critical sections**: on the board, the single [`kernel::Kernel`]
//!   lives behind `cortex_m::interrupt::Mutex`
//!
//! ## Host Builds
//!
//! Everything outside `arch`, `sync` and `syscall` is plain data
//! manipulation and is unit-tested on the host; those three modules only
//! exist when building for a bare-metal ARM target.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod task;
pub mod memory;
pub mod stack;
pub mod scheduler;
pub mod switch;
pub mod kernel;
pub mod gateway;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod sync;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod syscall;

pub use error::{ErrorKind, HeapError, KernelError};
pub use kernel::Kernel;
pub use task::{TaskControlBlock, TaskId, TaskState};
