//! The single error type shared by every fallible operation in this crate.
//!
//! The original C runtime reports failure with a plain `int` return (zero
//! or negative means failure). This port keeps the same closed set of
//! failure kinds but surfaces them as a `Result`, the idiomatic
//! equivalent — and, for the one kind that wraps an OS-level failure,
//! keeps the underlying `errno` around instead of discarding it, the way
//! this workspace's `mini-mio` crate already does with
//! `io::Error::last_os_error()` around its own raw syscalls.
use std::fmt;
use std::io;

/// Everything that can go wrong calling into the thread or semaphore layer.
#[derive(Debug)]
pub enum ThreadError {
    /// A null/invalid thread handle, a non-positive sleep duration, or a
    /// semaphore initial value outside `{0, 1}`.
    InvalidArgument(&'static str),
    /// `sem_down`/`sem_up`/`sem_destroy` called on a semaphore that was
    /// never created.
    Uninitialized,
    /// `sem_create` called on a semaphore that is already initialized.
    AlreadyInitialized,
    /// `destroy` called on a thread that isn't on the run queue.
    NotFound,
    /// Heap allocation for an entry record or wait-queue node failed.
    Allocation,
    /// An underlying OS primitive (context capture, signal or timer
    /// installation) failed.
    Os(io::Error),
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            ThreadError::Uninitialized => write!(f, "semaphore not initialized"),
            ThreadError::AlreadyInitialized => write!(f, "semaphore already initialized"),
            ThreadError::NotFound => write!(f, "thread not found in run queue"),
            ThreadError::Allocation => write!(f, "allocation failed"),
            ThreadError::Os(err) => write!(f, "OS primitive failed: {err}"),
        }
    }
}

impl std::error::Error for ThreadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ThreadError::Os(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ThreadError {
    fn from(err: io::Error) -> Self {
        ThreadError::Os(err)
    }
}

pub type Result<T> = std::result::Result<T, ThreadError>;
