//! # Architecture Layer
//!
//! Trap handlers and board glue. Only the Cortex-M4 port exists; the
//! rest of the crate never touches hardware and builds on any host.

pub mod cortex_m4;
