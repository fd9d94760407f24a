//! # Cortex-M4 Port Layer
//!
//! The three trap handlers the kernel runs on, and the board facts the
//! call gateway asks for.
//!
//! ## Stacks
//!
//! - **MSP** (main stack): `main()` before start, every exception handler
//!   afterwards. Top `MAIN_STACK_SIZE` bytes of RAM.
//! - **PSP** (process stack): every thread-mode context after start. The
//!   idle context's stack sits right below the main stack; each task's
//!   stack is a heap block.
//!
//! ```text
//!   _stack_start ┌──────────────┐
//!                │  main stack  │  MAIN_STACK_SIZE
//!                ├──────────────┤ ◄─ idle stack top
//!                │  idle stack  │  THREAD_STACK_SIZE
//!                ├──────────────┤ ◄─ heap end
//!                │     heap     │  task stacks + allocations
//!        __sheap └──────────────┘
//! ```
//!
//! ## Handlers
//!
//! - **SVCall**: decodes `svc #n`, runs the gateway, writes R0 back into
//!   the caller's frame. On a successful kernel start it moves the
//!   caller onto the idle process stack.
//! - **PendSV**: the context switch. Saves R4–R11 below the hardware
//!   frame on the outgoing PSP, hands that PSP to the kernel, restores
//!   R4–R11 from the one it returns.
//! - **SysTick**: the 1 kHz scheduler tick.
//!
//! PendSV and SysTick run at the lowest priority, so a switch never
//! lands in the middle of another handler. SVCall keeps the reset
//! priority (highest).
//!
//! Builds for `thumbv7em-none-eabi`: no task carries FPU state, so every
//! exception frame is the 8-word basic frame.

use core::arch::global_asm;
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;

use crate::config::{MAIN_STACK_SIZE, RESERVED_STACK_SIZE, SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::gateway::{self, Call, Opcode, Platform, RTX_ERR};
use crate::kernel::Kernel;
use crate::memory::RegionBounds;
use crate::sync::Shared;

/// Return to thread mode, basic frame, process stack.
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Words in a basic exception frame (R0–R3, R12, LR, PC, xPSR).
const BASIC_FRAME_WORDS: usize = 8;
const FRAME_PC: usize = 6;
const FRAME_XPSR: usize = 7;

/// xPSR bit 9: the hardware padded the stack to realign the frame.
const XPSR_STACK_ALIGN: u32 = 1 << 9;

static KERNEL: Shared<Kernel<'static>> = Shared::new(Kernel::new());

static HEAP_CLAIMED: AtomicBool = AtomicBool::new(false);

extern "C" {
    /// First free byte after `.bss`/`.uninit` (cortex-m-rt).
    static mut __sheap: u8;
    /// Initial MSP, top of RAM (cortex-m-rt).
    static _stack_start: u8;
}

/// Run `f` on the kernel instance, then pend PendSV if `f` left a switch
/// request behind.
pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel<'static>) -> R) -> R {
    KERNEL.lock(|kernel| {
        let result = f(kernel);
        if kernel.take_switch_request() {
            SCB::set_pendsv();
        }
        result
    })
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Link-time layout and the launch step, as the gateway sees them.
struct Board {
    launched: Option<usize>,
}

impl Board {
    const fn new() -> Self {
        Self { launched: None }
    }

    fn stack_start() -> usize {
        unsafe { ptr::addr_of!(_stack_start) as usize }
    }
}

impl Platform<'static> for Board {
    fn idle_stack_top(&self) -> usize {
        Self::stack_start() - MAIN_STACK_SIZE
    }

    fn claim_heap_region(&mut self) -> Option<&'static mut [u8]> {
        let bounds = RegionBounds {
            image_end: unsafe { ptr::addr_of_mut!(__sheap) as usize },
            stack_end: Self::stack_start(),
            min_stack_size: RESERVED_STACK_SIZE,
        };
        let span = bounds.span().ok()?;
        if HEAP_CLAIMED.swap(true, Ordering::AcqRel) {
            return None;
        }
        // The span lies between the end of the image and the reserved
        // stacks; nothing else in the program addresses it.
        Some(unsafe { core::slice::from_raw_parts_mut(span.start as *mut u8, span.len()) })
    }

    fn launch(&mut self, idle_sp: usize) {
        set_interrupt_priorities();
        // SAFETY: the kernel is the only user of SysTick.
        let mut peripherals = unsafe { cortex_m::Peripherals::steal() };
        configure_systick(&mut peripherals.SYST);
        self.launched = Some(idle_sp);
    }
}

// ---------------------------------------------------------------------------
// SysTick and priorities
// ---------------------------------------------------------------------------

/// Fire SysTick at `TICK_HZ` off the core clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    syst.set_reload(SYSTEM_CLOCK_HZ / TICK_HZ - 1);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// PendSV and SysTick at the lowest priority.
pub fn set_interrupt_priorities() {
    // System Handler Priority Register 3: PendSV [23:16], SysTick [31:24]
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    unsafe {
        let val = ptr::read_volatile(SHPR3);
        ptr::write_volatile(SHPR3, val | (0xFF << 16) | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// SVCall
// ---------------------------------------------------------------------------

// Pick the stack the caller was on, hand its frame and EXC_RETURN to
// `svc_dispatch`, and return through whatever EXC_RETURN comes back.
global_asm!(
    ".section .text.SVCall,\"ax\",%progbits",
    ".global SVCall",
    ".type SVCall,%function",
    ".thumb_func",
    "SVCall:",
    "    tst lr, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    mov r1, lr",
    "    push {{r4, lr}}",
    "    bl {dispatch}",
    "    pop {{r4, lr}}",
    "    bx r0",
    ".size SVCall, . - SVCall",
    dispatch = sym svc_dispatch,
);

/// Decode and run one gateway call. Returns the EXC_RETURN to leave with.
unsafe extern "C" fn svc_dispatch(frame: *mut u32, exc_return: u32) -> u32 {
    // `svc #imm` is a 16-bit Thumb instruction; the immediate is its low
    // byte, just before the stacked return address.
    let pc = ptr::read_volatile(frame.add(FRAME_PC)) as usize;
    let imm = ptr::read_volatile((pc - 2) as *const u8);

    let Ok(opcode) = Opcode::try_from(imm) else {
        log::warn!("unknown svc #{}", imm);
        ptr::write_volatile(frame, RTX_ERR as u32);
        return exc_return;
    };

    let r0 = ptr::read_volatile(frame) as usize;
    let r1 = ptr::read_volatile(frame.add(1)) as usize;
    let call = Call::decode(opcode, r0, r1);

    let mut board = Board::new();
    let result = with_kernel(|kernel| gateway::dispatch(kernel, &mut board, call));
    ptr::write_volatile(frame, result as u32);

    match board.launched {
        Some(idle_sp) => move_to_process_stack(frame, idle_sp),
        None => exc_return,
    }
}

/// Copy the caller's frame onto the idle process stack, so the exception
/// return resumes the caller in thread mode on PSP.
unsafe fn move_to_process_stack(frame: *const u32, idle_sp: usize) -> u32 {
    let psp = (idle_sp & !0x07) as *mut u32;
    let psp = psp.sub(BASIC_FRAME_WORDS);
    ptr::copy_nonoverlapping(frame, psp, BASIC_FRAME_WORDS);

    // The new frame is aligned; drop any padding marker from the old one.
    let xpsr = psp.add(FRAME_XPSR);
    ptr::write_volatile(xpsr, ptr::read_volatile(xpsr) & !XPSR_STACK_ALIGN);

    cortex_m::register::psp::write(psp as u32);
    EXC_RETURN_THREAD_PSP
}

// ---------------------------------------------------------------------------
// PendSV (context switch)
// ---------------------------------------------------------------------------

// Save R4–R11 on the outgoing PSP, let the kernel swap stack pointers,
// restore R4–R11 from the incoming PSP, return to thread mode on PSP.
global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "    cpsid i",
    "    mrs r0, psp",
    "    stmdb r0!, {{r4-r11}}",
    "    bl {switch}",
    "    ldmia r0!, {{r4-r11}}",
    "    msr psp, r0",
    "    mvn r0, #2",
    "    cpsie i",
    "    bx r0",
    ".size PendSV, . - PendSV",
    switch = sym switch_context,
);

extern "C" fn switch_context(outgoing_sp: usize) -> usize {
    with_kernel(|kernel| kernel.switch_context(outgoing_sp))
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn SysTick() {
    with_kernel(|kernel| kernel.tick());
}
