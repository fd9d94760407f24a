//! # Initial Stack Frame
//!
//! A new task has never been interrupted, yet the first switch into it
//! restores its context exactly like any other: PendSV pops R4–R11, then
//! exception return pops the hardware frame. So `create_task` seeds the
//! top of the new stack with a frame that looks like the task was
//! interrupted just before its first instruction.
//!
//! This module is the only place that encodes that layout.
//!
//! ## Frame Layout (low address first)
//!
//! ```text
//!   stack_pointer ─► R4  R5  R6  R7  R8  R9  R10 R11   software-saved
//!                    R0  R1  R2  R3  R12 LR  PC  xPSR  hardware-stacked
//!                                                  ▲
//!                                        8-byte aligned top of stack
//! ```
//!
//! PC holds the entry point, xPSR has only the Thumb bit set, and every
//! other slot holds [`STACK_FILL`].

use crate::config::{STACK_FILL, WORD_SIZE};

/// Registers in the seeded frame: 8 software-saved + 8 hardware-stacked.
pub const FRAME_WORDS: usize = 16;

/// Bytes occupied by the seeded frame.
pub const FRAME_SIZE: usize = FRAME_WORDS * WORD_SIZE;

/// xPSR with the Thumb state bit set and nothing else.
pub const XPSR_THUMB: u32 = 1 << 24;

const PC_SLOT: usize = 14;
const XPSR_SLOT: usize = 15;

/// The 16 words of an initial frame, lowest address first.
pub const fn initial_frame(entry: u32) -> [u32; FRAME_WORDS] {
    let mut frame = [STACK_FILL; FRAME_WORDS];
    // Stacked PC must be halfword-aligned; drop the Thumb bit of the
    // function address.
    frame[PC_SLOT] = entry & !1;
    frame[XPSR_SLOT] = XPSR_THUMB;
    frame
}

/// Write an initial frame at the top of `stack` and return the offset
/// within `stack` of the resulting stack pointer.
///
/// The top is rounded down so the frame ends on an 8-byte boundary
/// (AAPCS). Returns `None` if the stack cannot hold the frame.
pub fn seed(stack: &mut [u8], entry: u32) -> Option<usize> {
    let base = stack.as_ptr() as usize;
    let top = ((base + stack.len()) & !0x07).checked_sub(base)?;
    let sp = top.checked_sub(FRAME_SIZE)?;

    for (i, word) in initial_frame(entry).iter().enumerate() {
        let at = sp + i * WORD_SIZE;
        stack[at..at + WORD_SIZE].copy_from_slice(&word.to_le_bytes());
    }
    Some(sp)
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
