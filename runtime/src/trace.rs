//! Minimal opt-in event tracing for scheduler and semaphore activity.
//!
//! Every demo in this workspace already narrates its own execution with
//! plain `println!`; this generalizes that habit for library code that
//! doesn't get to assume it owns the caller's stdout. Checked once per
//! process and cached, so a disabled trace costs one atomic load.
use std::sync::atomic::{AtomicU8, Ordering};

const UNSET: u8 = 0;
const ON: u8 = 1;
const OFF: u8 = 2;

static STATE: AtomicU8 = AtomicU8::new(UNSET);

fn enabled() -> bool {
    match STATE.load(Ordering::Relaxed) {
        ON => true,
        OFF => false,
        _ => {
            let on = std::env::var_os("RUNTIME_TRACE").is_some();
            STATE.store(if on { ON } else { OFF }, Ordering::Relaxed);
            on
        }
    }
}

#[doc(hidden)]
pub fn trace_event(args: std::fmt::Arguments) {
    if enabled() {
        eprintln!("[runtime] {args}");
    }
}

macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::trace::trace_event(format_args!($($arg)*))
    };
}

pub(crate) use trace;
