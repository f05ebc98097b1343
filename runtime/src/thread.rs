//! The scheduler: per-thread bookkeeping, the circular run queue, and the
//! voluntary/preemptive yield loop that picks what runs next.
//!
//! Threads are caller-owned, the way the C source's `mythr_t` is a struct
//! the caller declares and passes a pointer to — not a handle this crate
//! hands back from a pool. The run queue is an intrusive circular linked
//! list threaded through each `Thread`'s own `next` pointer; the runtime
//! keeps only a `head` pointer to an arbitrary member and a `current`
//! pointer to the one presently running, exactly the two pointers the
//! data model calls for.
use std::cell::Cell;
use std::os::raw::c_int;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use coroutine::CoCtx;
pub use coroutine::{EntryArg, EntryFn};

use crate::error::{Result, ThreadError};
use crate::timer::{self, SignalMask, Timeval};
use crate::trace::trace;

/// A logical thread of control: a coroutine plus the state the scheduler
/// needs to decide whether it's eligible to run.
///
/// Caller-owned: declare one (on the stack, in a `Box`, wherever), pass a
/// `&mut Thread` to [`create`], and keep it alive until [`join`] or
/// [`destroy`] — this crate never frees a `Thread` itself.
///
/// # Safety
/// Once spliced into the run queue by [`init`] or [`create`], a `Thread`
/// must not move in memory (no moving it out of the binding that holds
/// it) until it has been removed via [`destroy`] or the runtime has been
/// torn down via [`cleanup`]. The run queue holds raw pointers into it.
pub struct Thread {
    ctx: CoCtx,
    finished: Cell<bool>,
    available: Cell<bool>,
    sleeping: Cell<bool>,
    sleep_until: Cell<Timeval>,
    next: Cell<*mut Thread>,
}

impl Thread {
    /// An uninitialized thread handle. Not schedulable until passed to
    /// [`init`] (exactly one, the "main" thread) or [`create`].
    pub fn new() -> Self {
        Thread {
            ctx: CoCtx::new(),
            finished: Cell::new(false),
            available: Cell::new(false),
            sleeping: Cell::new(false),
            sleep_until: Cell::new(Timeval::ZERO),
            next: Cell::new(ptr::null_mut()),
        }
    }

    /// True once this thread's body has returned.
    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// True iff the scheduler may currently select this thread.
    pub fn is_available(&self) -> bool {
        self.available.get()
    }

    /// Flip eligibility for scheduling. Used by the semaphore layer to
    /// park a thread on `down` and release it again from `up`.
    pub(crate) fn set_available(&self, available: bool) {
        self.available.set(available);
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry record consumed exactly once by [`thread_trampoline`]: the
/// user's body and argument, plus the thread that owns this invocation so
/// the trampoline can flip `finished`/`available` when the body returns.
struct ThreadEntry {
    body: EntryFn,
    arg: EntryArg,
    owner: *mut Thread,
}

/// Process-wide scheduler state: the currently running thread, an anchor
/// into the run queue, and a diagnostic counter for semaphore ids.
struct RuntimeState {
    current: *mut Thread,
    head: *mut Thread,
    sem_id_counter: u64,
}

static RUNTIME: AtomicPtr<RuntimeState> = AtomicPtr::new(ptr::null_mut());

fn runtime() -> Option<&'static mut RuntimeState> {
    let ptr = RUNTIME.load(Ordering::SeqCst);
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { &mut *ptr })
    }
}

fn runtime_or_panic() -> &'static mut RuntimeState {
    runtime().expect("thread runtime not initialized; call thread::init() first")
}

/// The thread presently running, for callers (like the semaphore layer)
/// that need to enqueue or inspect it without reaching into `RuntimeState`.
pub(crate) fn current_ptr() -> Option<*mut Thread> {
    runtime().map(|rt| rt.current)
}

/// Allocate the next diagnostic semaphore id.
pub(crate) fn next_sem_id() -> u64 {
    let rt = runtime_or_panic();
    rt.sem_id_counter += 1;
    rt.sem_id_counter
}

/// Record `main` as the current thread, form a one-element run queue
/// containing only it, capture its coroutine context, install the
/// preemption signal handler, and arm the periodic timer.
pub fn init(main: &mut Thread) -> Result<()> {
    main.ctx.init()?;
    main.finished.set(false);
    main.available.set(true);
    main.sleeping.set(false);
    let main_ptr: *mut Thread = main;
    main.next.set(main_ptr);

    let state = Box::new(RuntimeState {
        current: main_ptr,
        head: main_ptr,
        sem_id_counter: 0,
    });
    RUNTIME.store(Box::into_raw(state), Ordering::SeqCst);

    timer::install_preemption_timer(preemption_signal_handler)?;
    trace!("init: main thread seeded, preemption timer armed");
    Ok(())
}

extern "C" fn preemption_signal_handler(_signum: c_int) {
    // A signal delivered while `yield_now` already holds the mask is held
    // pending by the OS and redelivered once we unblock; it then simply
    // performs another yield on whichever thread is now current.
    let _ = yield_now();
}

/// Allocate an entry record, arm `thr`'s coroutine to run `body(arg)`
/// through [`thread_trampoline`], and splice `thr` into the run queue
/// immediately before the current head (the tail of the circular order).
/// The new thread does not run until the scheduler selects it.
pub fn create(thr: &mut Thread, body: EntryFn, arg: EntryArg) -> Result<()> {
    let rt = runtime_or_panic();
    let owner: *mut Thread = thr;

    let entry = Box::new(ThreadEntry { body, arg, owner });
    let entry_ptr = Box::into_raw(entry) as EntryArg;

    thr.finished.set(false);
    thr.available.set(true);
    thr.sleeping.set(false);

    unsafe {
        let link: &CoCtx = &(*rt.head).ctx;
        if let Err(err) = thr.ctx.create(thread_trampoline, entry_ptr, link) {
            // undo the entry allocation so we don't leak on the error path
            drop(Box::from_raw(entry_ptr as *mut ThreadEntry));
            return Err(ThreadError::from(err));
        }
    }

    unsafe {
        let mut prev = rt.head;
        while (*prev).next.get() != rt.head {
            prev = (*prev).next.get();
        }
        (*prev).next.set(owner);
        thr.next.set(rt.head);
    }

    trace!("create: thread {:p} spliced into run queue", owner);
    Ok(())
}

/// Entry point the coroutine layer invokes on first switch into a
/// thread-layer coroutine. Runs the user's body, marks the thread
/// finished and unavailable, frees the entry record, and yields — which
/// never returns, since the scheduler will never again select a finished
/// thread.
extern "C" fn thread_trampoline(raw: EntryArg) {
    let entry = unsafe { Box::from_raw(raw as *mut ThreadEntry) };
    let ThreadEntry { body, arg, owner } = *entry;

    body(arg);

    unsafe {
        (*owner).finished.set(true);
        (*owner).available.set(false);
    }
    trace!("thread {:p} finished", owner);

    let _ = yield_now();
    unreachable!("a finished thread must never be rescheduled");
}

/// The central scheduling step. Blocks the preemption signal, saves the
/// current thread's context, walks the run queue round-robin until an
/// eligible thread is found (clearing `sleeping` on any candidate whose
/// deadline has passed), and switches to it.
pub fn yield_now() -> Result<()> {
    let Some(rt) = runtime() else {
        // Mirrors the source's `if (curr) { ... }` guard: yielding before
        // (or after) the runtime is live is a silent no-op, since the
        // signal handler can in principle call this at any time.
        return Ok(());
    };

    let _mask = SignalMask::block();

    let prev = rt.current;
    let mut candidate = prev;
    loop {
        candidate = unsafe { (*candidate).next.get() };
        unsafe {
            if (*candidate).sleeping.get() && timer::now_ge((*candidate).sleep_until.get()) {
                (*candidate).sleeping.set(false);
            }
        }
        let eligible = unsafe {
            (*candidate).available.get() && !(*candidate).sleeping.get() && !(*candidate).finished.get()
        };
        if eligible {
            break;
        }
    }

    rt.current = candidate;
    unsafe {
        CoCtx::switchto(&mut (*prev).ctx, &(*candidate).ctx);
    }

    // `_mask` drops here, unblocking the preemption signal, on every path
    // that reaches this point "after" a resume, whether that's the normal
    // fall-through or a later re-entry into this same suspended call.
    Ok(())
}

/// Suspend the calling thread until at least `seconds` of wall-clock time
/// have passed. Fails without suspending if `seconds <= 0`.
pub fn sleep(seconds: i64) -> Result<()> {
    if seconds <= 0 {
        return Err(ThreadError::InvalidArgument("sleep seconds must be greater than 0"));
    }

    let rt = runtime_or_panic();
    let now = timer::now();
    let deadline = Timeval {
        tv_sec: now.tv_sec + seconds,
        tv_usec: now.tv_usec,
    };

    unsafe {
        (*rt.current).sleep_until.set(deadline);
        (*rt.current).sleeping.set(true);
    }

    yield_now()
}

/// Yield repeatedly until `thr` has finished. Correctness depends on the
/// caller (and everyone else) yielding frequently; there is no
/// event-based wakeup.
pub fn join(thr: &Thread) -> Result<()> {
    while !thr.finished.get() {
        yield_now()?;
    }
    Ok(())
}

/// Remove `thr` from the run queue. If it was the current thread, advance
/// `current` to its successor (or clear both `current` and `head` if it
/// was the only thread left). Marks `thr` finished and unavailable.
///
/// # Safety contract
/// The caller must not destroy a thread whose stack is in use by a
/// context switch currently in flight. This cannot happen from calls
/// made through this crate's own API, since every operation here runs
/// either before a switch is initiated or after one has completed —
/// never mid-switch — but a caller holding a raw pointer to `thr` from
/// outside this crate could still violate it.
pub fn destroy(thr: &mut Thread) -> Result<()> {
    let rt = runtime_or_panic();
    let thr_ptr: *mut Thread = thr;

    if rt.head.is_null() {
        return Err(ThreadError::NotFound);
    }

    if rt.current == thr_ptr {
        rt.current = unsafe { (*thr_ptr).next.get() };
        if rt.current == thr_ptr {
            rt.current = ptr::null_mut();
            rt.head = ptr::null_mut();
        }
    }

    if !rt.head.is_null() {
        let mut prev = rt.head;
        loop {
            if unsafe { (*prev).next.get() } == thr_ptr {
                break;
            }
            prev = unsafe { (*prev).next.get() };
            if prev == rt.head {
                return Err(ThreadError::NotFound);
            }
        }
        let successor = unsafe { (*thr_ptr).next.get() };
        unsafe { (*prev).next.set(successor) };
        if rt.head == thr_ptr {
            rt.head = successor;
        }
    }

    thr.finished.set(true);
    thr.available.set(false);
    trace!("destroy: thread {:p} removed from run queue", thr_ptr);
    Ok(())
}

/// Disarm the preemption timer, restore the default `SIGALRM` disposition,
/// and drop the global scheduler state.
pub fn cleanup() -> Result<()> {
    timer::teardown_preemption_timer()?;
    let ptr = RUNTIME.swap(ptr::null_mut(), Ordering::SeqCst);
    if !ptr.is_null() {
        unsafe { drop(Box::from_raw(ptr)) };
    }
    trace!("cleanup: runtime torn down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_void;
    use std::sync::atomic::{AtomicU32, Ordering as AOrd};

    // These tests install a process-wide SIGALRM timer and a single
    // global scheduler; they must not run concurrently with each other.
    // Run this crate's tests with `--test-threads=1`.

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    extern "C" fn bump_counter(_arg: EntryArg) {
        for _ in 0..3 {
            COUNTER.fetch_add(1, AOrd::SeqCst);
            yield_now().unwrap();
        }
    }

    #[test]
    fn two_threads_round_robin_to_completion() {
        COUNTER.store(0, AOrd::SeqCst);

        let mut main = Thread::new();
        init(&mut main).unwrap();

        let mut t1 = Thread::new();
        let mut t2 = Thread::new();
        create(&mut t1, bump_counter, std::ptr::null_mut::<c_void>()).unwrap();
        create(&mut t2, bump_counter, std::ptr::null_mut::<c_void>()).unwrap();

        join(&t1).unwrap();
        join(&t2).unwrap();

        assert!(t1.is_finished());
        assert!(t2.is_finished());
        assert_eq!(COUNTER.load(AOrd::SeqCst), 6);

        cleanup().unwrap();
    }

    #[test]
    fn destroying_the_only_thread_empties_the_queue() {
        let mut main = Thread::new();
        init(&mut main).unwrap();

        destroy(&mut main).unwrap();
        assert!(runtime().is_none() || runtime().unwrap().head.is_null());

        cleanup().unwrap();
    }

    #[test]
    fn sleep_rejects_non_positive_durations() {
        let mut main = Thread::new();
        init(&mut main).unwrap();

        let err = sleep(0).unwrap_err();
        assert!(matches!(err, ThreadError::InvalidArgument(_)));

        cleanup().unwrap();
    }
}
