//! FFI glue for the periodic preemption timer and its signal handler.
//!
//! Like `mini-mio`'s `ffi` module, this hand-writes the handful of POSIX
//! declarations it needs (`sigaction`, `setitimer`, `gettimeofday`) rather
//! than pulling in a crate for them — this workspace already has the
//! precedent of talking to the OS directly through `extern "C"` blocks
//! when the surface needed is this small.
#![allow(dead_code)]

use std::io;
use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_void};

use crate::config::TICK_INTERVAL_US;

pub const SIGALRM: c_int = 14;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timeval {
    pub tv_sec: i64,
    pub tv_usec: i64,
}

impl Timeval {
    pub const ZERO: Timeval = Timeval { tv_sec: 0, tv_usec: 0 };
}

/// True if the current wall-clock time has reached or passed `deadline`.
pub fn now_ge(deadline: Timeval) -> bool {
    now() >= deadline
}

#[repr(C)]
struct Itimerval {
    it_interval: Timeval,
    it_value: Timeval,
}

#[repr(C)]
struct Sigaction {
    sa_handler: usize,
    sa_mask: [u64; 16], // oversized sigset_t; only the handler/flags fields below matter to us
    sa_flags: c_int,
    sa_restorer: usize,
}

#[repr(C)]
struct Sigset {
    bits: [u64; 16],
}

const ITIMER_REAL: c_int = 0;
const SIG_BLOCK: c_int = 0;
const SIG_UNBLOCK: c_int = 1;
const SIG_DFL: usize = 0;

extern "C" {
    fn sigaction(signum: c_int, act: *const Sigaction, oldact: *mut Sigaction) -> c_int;
    fn setitimer(which: c_int, new_value: *const Itimerval, old_value: *mut Itimerval) -> c_int;
    fn gettimeofday(tv: *mut Timeval, tz: *mut c_void) -> c_int;
    fn sigemptyset(set: *mut Sigset) -> c_int;
    fn sigaddset(set: *mut Sigset, signum: c_int) -> c_int;
    fn sigprocmask(how: c_int, set: *const Sigset, oldset: *mut Sigset) -> c_int;
}

/// Current wall-clock time with microsecond resolution.
pub fn now() -> Timeval {
    let mut tv = MaybeUninit::<Timeval>::uninit();
    let res = unsafe { gettimeofday(tv.as_mut_ptr(), std::ptr::null_mut()) };
    debug_assert_eq!(res, 0, "gettimeofday should not fail on a well-formed pointer");
    unsafe { tv.assume_init() }
}

/// Install `handler` for `SIGALRM` and arm a repeating timer at
/// [`TICK_INTERVAL_US`] (both initial delay and period).
pub fn install_preemption_timer(handler: extern "C" fn(c_int)) -> io::Result<()> {
    let act = Sigaction {
        sa_handler: handler as usize,
        sa_mask: [0; 16],
        sa_flags: 0,
        sa_restorer: 0,
    };

    let res = unsafe { sigaction(SIGALRM, &act, std::ptr::null_mut()) };
    if res != 0 {
        return Err(io::Error::last_os_error());
    }

    let interval = Timeval {
        tv_sec: 0,
        tv_usec: TICK_INTERVAL_US,
    };
    let timer = Itimerval {
        it_interval: interval,
        it_value: interval,
    };

    let res = unsafe { setitimer(ITIMER_REAL, &timer, std::ptr::null_mut()) };
    if res != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Disarm the preemption timer and restore the default `SIGALRM` disposition.
pub fn teardown_preemption_timer() -> io::Result<()> {
    let disarm = Itimerval {
        it_interval: Timeval::ZERO,
        it_value: Timeval::ZERO,
    };
    let res = unsafe { setitimer(ITIMER_REAL, &disarm, std::ptr::null_mut()) };
    if res != 0 {
        return Err(io::Error::last_os_error());
    }

    let act = Sigaction {
        sa_handler: SIG_DFL,
        sa_mask: [0; 16],
        sa_flags: 0,
        sa_restorer: 0,
    };
    let res = unsafe { sigaction(SIGALRM, &act, std::ptr::null_mut()) };
    if res != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// RAII guard blocking `SIGALRM` for its lifetime: the scoped
/// "scheduler-critical region" the design notes call for. Unblocks on
/// every exit path, including an unwinding panic, since the guard's
/// `Drop` always runs.
pub struct SignalMask {
    set: Sigset,
}

impl SignalMask {
    /// Block `SIGALRM` so the timer handler cannot re-enter the caller
    /// while this guard is alive.
    pub fn block() -> Self {
        let mut set = Sigset { bits: [0; 16] };
        unsafe {
            sigemptyset(&mut set);
            sigaddset(&mut set, SIGALRM);
            sigprocmask(SIG_BLOCK, &set, std::ptr::null_mut());
        }
        SignalMask { set }
    }
}

impl Drop for SignalMask {
    fn drop(&mut self) {
        unsafe {
            sigprocmask(SIG_UNBLOCK, &self.set, std::ptr::null_mut());
        }
    }
}
