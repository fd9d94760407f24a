//! # DkOS Example Firmware
//!
//! Boots the kernel with three tasks, each running a fixed number of
//! rounds and then exiting:
//!
//! | Task | Deadline | Behavior |
//! |------|----------|----------|
//! | `counter_fast` | 3 ms | Counts, yields every round |
//! | `scratch` | 5 ms | Borrows heap buffers, yields every round |
//! | `counter_slow` | 8 ms | Counts in longer bursts, yields every round |
//!
//! A yield restarts the caller's countdown at its own deadline, so the
//! tasks finish in deadline order. Each exit hands its stack back to the
//! heap. After `kernel_start` succeeds, `main` carries on as the idle
//! context and sleeps until the next interrupt whenever no task is ready.
//!
//! Build with `cargo build --release --target thumbv7em-none-eabi
//! --features firmware`.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;

use dkos::syscall;
use dkos::task::TaskControlBlock;

const ROUNDS: u32 = 16;

static FAST_COUNT: AtomicU32 = AtomicU32::new(0);
static SLOW_COUNT: AtomicU32 = AtomicU32::new(0);

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

extern "C" fn counter_fast() -> ! {
    for _ in 0..ROUNDS {
        FAST_COUNT.fetch_add(1, Ordering::Relaxed);
        syscall::yield_now();
    }
    finish()
}

extern "C" fn counter_slow() -> ! {
    for _ in 0..ROUNDS {
        let mut work: u32 = 0;
        for _ in 0..20_000 {
            work = work.wrapping_add(1);
        }
        SLOW_COUNT.fetch_add(work, Ordering::Relaxed);
        syscall::yield_now();
    }
    finish()
}

/// Exercises the heap from task context.
extern "C" fn scratch() -> ! {
    for round in 1..=ROUNDS as usize {
        if let Some(buf) = syscall::mem_alloc(round * 32) {
            unsafe { core::ptr::write_bytes(buf.as_ptr(), 0x5A, round * 32) };
            let _ = syscall::mem_dealloc(buf.as_ptr());
        }
        syscall::yield_now();
    }
    finish()
}

fn finish() -> ! {
    let _ = syscall::task_exit();
    halt()
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    if syscall::kernel_init().is_err() || syscall::mem_init().is_err() {
        halt();
    }

    let tasks: [(extern "C" fn() -> !, u16, i32); 3] = [
        (counter_fast, 0x400, 3),
        (scratch, 0x600, 5),
        (counter_slow, 0x400, 8),
    ];
    for (entry, stack_size, deadline) in tasks {
        let mut tcb = TaskControlBlock::new(entry, stack_size);
        let Ok(id) = syscall::create_task(&mut tcb) else {
            halt();
        };
        if syscall::set_deadline(deadline, id).is_err() {
            halt();
        }
    }

    if syscall::kernel_start().is_err() {
        halt();
    }

    // Idle context
    loop {
        cortex_m::asm::wfi();
    }
}

fn halt() -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}
