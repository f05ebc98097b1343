//! A user-space cooperative-and-preemptive threading runtime built on the
//! `coroutine` crate's stackful coroutines: a round-robin scheduler driven
//! by both voluntary yields and a `SIGALRM` preemption tick, plus counting
//! semaphores for synchronization between threads.
//!
//! The public surface mirrors the three-layer shape the design calls for:
//! [`thread`] (the scheduler and thread lifecycle) and [`sem`] (counting
//! semaphores) sit on top of the `coroutine` crate's context-switching
//! primitives. [`error`] and [`config`] are the ambient pieces every public
//! operation here is built on.
pub mod config;
pub mod error;
pub mod sem;
pub mod thread;
mod timer;
mod trace;

pub use error::{Result, ThreadError};
pub use sem::Sem;
pub use thread::{create, destroy, init, join, sleep, yield_now, EntryArg, EntryFn, Thread};
