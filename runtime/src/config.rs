//! Tuning knobs collected in one place instead of scattered as literals.
//!
//! Mirrors the pattern the grounding codebase already uses at the top of
//! `stackfull-coroutine` (`DEFAULT_STACK_SIZE`, `MAX_THREADS`), just named
//! and grouped under a module so a caller embedding this runtime can see
//! every tunable without grepping for magic numbers.
pub use coroutine::STACK_SIZE;

/// Interval, in microseconds, between preemption timer ticks. Used as both
/// the initial delay and the repeat interval of the `setitimer` that
/// drives involuntary yields.
pub const TICK_INTERVAL_US: i64 = 1_000;

/// Capacity hint for a freshly created semaphore's wait queue. Not a cap —
/// the queue grows without bound as threads block — just an allocation
/// hint so the first few `down` calls don't each pay for a reallocation.
pub const SEM_WAIT_QUEUE_HINT: usize = 4;
