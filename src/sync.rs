//! # Shared Kernel State
//!
//! Thread code (through SVCall) and the SysTick/PendSV handlers all
//! reach the same kernel instance. [`Shared`] is the one way in: every
//! access runs with interrupts masked, for the full duration of the
//! closure.

use core::cell::RefCell;

use cortex_m::interrupt::{self, Mutex};

/// A value reachable from thread mode and every exception handler.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` on the value inside a critical section.
    ///
    /// Must not be re-entered from inside `f`.
    #[inline]
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        interrupt::free(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }
}
