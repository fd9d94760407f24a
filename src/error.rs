//! # Kernel Errors
//!
//! Every fallible kernel operation returns one of these. At the call
//! gateway they all collapse to `RTX_ERR`; inside the crate they keep
//! enough detail for logging and tests.

use thiserror::Error;

use crate::task::TaskId;

/// Broad classification of a failure, independent of which operation
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad argument from the caller: null pointer, out-of-range id,
    /// non-positive deadline, undersized stack.
    InvalidArgument,
    /// Task table full or no free block large enough.
    ResourceExhausted,
    /// Operation not allowed in the current state: double free, wrong
    /// owner, corrupt header, nothing running, non-READY target.
    StateViolation,
    /// Kernel or heap already initialized.
    AlreadyInitialized,
}

/// Heap allocator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("heap already initialized")]
    AlreadyInitialized,

    #[error("heap not initialized")]
    NotInitialized,

    #[error("heap region of {len} bytes cannot hold a block")]
    RegionTooSmall { len: usize },

    #[error("heap region bounds are inverted or exceed 32-bit sizes")]
    InvalidRegion,

    #[error("zero-sized allocation")]
    InvalidSize,

    #[error("out of memory (requested: {requested} bytes)")]
    OutOfMemory { requested: usize },

    #[error("pointer {addr:#x} is not a heap payload")]
    InvalidPointer { addr: usize },

    #[error("double free of block at offset {offset:#x}")]
    NotAllocated { offset: usize },

    #[error("block at offset {offset:#x} is owned by task {owner}, not {caller}")]
    WrongOwner { offset: usize, owner: TaskId, caller: TaskId },

    #[error("block at offset {offset:#x} has corrupt size {size}")]
    CorruptBlock { offset: usize, size: usize },
}

impl HeapError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            Self::RegionTooSmall { .. }
            | Self::InvalidRegion
            | Self::InvalidSize
            | Self::InvalidPointer { .. } => ErrorKind::InvalidArgument,
            Self::OutOfMemory { .. } => ErrorKind::ResourceExhausted,
            Self::NotInitialized
            | Self::NotAllocated { .. }
            | Self::WrongOwner { .. }
            | Self::CorruptBlock { .. } => ErrorKind::StateViolation,
        }
    }
}

/// Task lifecycle and scheduling errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("kernel already initialized")]
    AlreadyInitialized,

    #[error("kernel not initialized")]
    NotInitialized,

    #[error("kernel already started")]
    AlreadyStarted,

    #[error("kernel not started")]
    NotStarted,

    #[error("no task is running")]
    NoRunningTask,

    #[error("task table full")]
    TaskTableFull,

    #[error("task has no entry point")]
    MissingEntry,

    #[error("stack size {size} is below the minimum or not word-aligned")]
    InvalidStackSize { size: u16 },

    #[error("task id {0} is out of range or unused")]
    InvalidTaskId(TaskId),

    #[error("deadline {0} is not positive")]
    InvalidDeadline(i32),

    #[error("task {0} is the running task")]
    TargetIsRunning(TaskId),

    #[error("task {0} is not ready")]
    TaskNotReady(TaskId),

    #[error("heap: {0}")]
    Heap(#[from] HeapError),
}

impl KernelError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            Self::MissingEntry
            | Self::InvalidStackSize { .. }
            | Self::InvalidTaskId(_)
            | Self::InvalidDeadline(_) => ErrorKind::InvalidArgument,
            Self::TaskTableFull => ErrorKind::ResourceExhausted,
            Self::NotInitialized
            | Self::AlreadyStarted
            | Self::NotStarted
            | Self::NoRunningTask
            | Self::TargetIsRunning(_)
            | Self::TaskNotReady(_) => ErrorKind::StateViolation,
            Self::Heap(e) => e.kind(),
        }
    }
}

pub type Result<T> = core::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_errors_classify_through_kernel_error() {
        let oom: KernelError = HeapError::OutOfMemory { requested: 64 }.into();
        assert_eq!(oom.kind(), ErrorKind::ResourceExhausted);

        let double: KernelError = HeapError::NotAllocated { offset: 0x10 }.into();
        assert_eq!(double.kind(), ErrorKind::StateViolation);
    }

    #[test]
    fn kernel_error_kinds() {
        assert_eq!(KernelError::TaskTableFull.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(KernelError::InvalidDeadline(0).kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            KernelError::TaskNotReady(TaskId::from_slot(3)).kind(),
            ErrorKind::StateViolation
        );
        assert_eq!(KernelError::AlreadyInitialized.kind(), ErrorKind::AlreadyInitialized);
    }
}
