//! # DkOS Configuration
//!
//! Compile-time constants governing the task table, the heap and the
//! scheduler tick. All limits are fixed at compile time.

/// Number of task slots, including the reserved slot 0 (null/idle).
/// At most `MAX_TASKS - 1` user tasks can be live at once.
pub const MAX_TASKS: usize = 16;

/// Minimum stack size accepted by `create_task`, in bytes.
pub const MIN_STACK_SIZE: u16 = 0x200;

/// Deadline (and initial `time_left`) given to every new task, in ms.
pub const DEFAULT_DEADLINE: u32 = 5;

/// Machine word size. Heap sizes and stack sizes are multiples of this.
pub const WORD_SIZE: usize = 4;

/// Bytes at the top of RAM reserved for the main stack (MSP), used by
/// `main()` before start and by every exception handler afterwards.
pub const MAIN_STACK_SIZE: usize = 0x400;

/// Size of the idle context's process stack, carved right below the
/// main stack.
pub const THREAD_STACK_SIZE: u16 = 0x400;

/// Bytes kept out of the heap at the top of RAM: main stack plus the
/// idle process stack.
pub const RESERVED_STACK_SIZE: usize = MAIN_STACK_SIZE + THREAD_STACK_SIZE as usize;

/// Placeholder written into every general-purpose register slot of a
/// freshly seeded stack frame. Easy to spot in a memory dump.
pub const STACK_FILL: u32 = 0x0000_000A;

/// SysTick frequency in Hz. One tick is one unit of `time_left` (1 ms).
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F4 HSI default, 16 MHz).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
