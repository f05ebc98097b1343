//! Counting semaphores with a FIFO wait queue, integrated with the
//! scheduler so `down` suspends the caller when the count goes negative
//! and `up` wakes the head waiter.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::config::SEM_WAIT_QUEUE_HINT;
use crate::error::{Result, ThreadError};
use crate::thread::{self, Thread};
use crate::trace::trace;

/// A counting semaphore. Initial value restricted to `{0, 1}` at
/// [`Sem::create`], after which `value` ranges freely as `down`/`up` are
/// called — a binary initializer guarding a plain counting semaphore.
///
/// The wait queue is a `VecDeque` of raw thread pointers rather than a
/// hand-linked list of heap nodes: same FIFO behavior and the same
/// allocate-on-`down`/free-on-`up` lifecycle the design calls for,
/// without a bespoke node type.
pub struct Sem {
    initialized: Cell<bool>,
    value: Cell<i64>,
    queue: RefCell<VecDeque<*mut Thread>>,
    id: Cell<u64>,
}

impl Sem {
    /// An uninitialized semaphore. Must be passed to [`Sem::create`]
    /// before `down`/`up`/`destroy` will accept it.
    pub fn new() -> Self {
        Sem {
            initialized: Cell::new(false),
            value: Cell::new(0),
            queue: RefCell::new(VecDeque::with_capacity(SEM_WAIT_QUEUE_HINT)),
            id: Cell::new(0),
        }
    }

    /// Diagnostic id assigned at creation, for tracing.
    pub fn id(&self) -> u64 {
        self.id.get()
    }

    /// Current value. Negative means `|value|` threads are queued.
    pub fn value(&self) -> i64 {
        self.value.get()
    }

    /// Initialize with `n ∈ {0, 1}`. Fails if `n` is out of range or `self`
    /// is already initialized.
    pub fn create(&self, n: i64) -> Result<()> {
        if n != 0 && n != 1 {
            return Err(ThreadError::InvalidArgument("semaphore initial value must be 0 or 1"));
        }
        if self.initialized.get() {
            return Err(ThreadError::AlreadyInitialized);
        }

        let id = thread::next_sem_id();
        self.id.set(id);
        self.value.set(n);
        self.queue.borrow_mut().clear();
        self.initialized.set(true);
        trace!("sem {id}: created, initial value {n}");
        Ok(())
    }

    /// Decrement the count. If it goes negative, enqueue the caller,
    /// mark it unavailable, and yield; returns once a matching `up` has
    /// released it.
    pub fn down(&self) -> Result<()> {
        if !self.initialized.get() {
            return Err(ThreadError::Uninitialized);
        }

        self.value.set(self.value.get() - 1);
        trace!("sem {}: down -> {}", self.id.get(), self.value.get());

        if self.value.get() < 0 {
            let current = thread::current_ptr().expect("sem_down called before thread::init");
            self.queue.borrow_mut().push_back(current);
            unsafe { (*current).set_available(false) };
            thread::yield_now()?;
        }

        Ok(())
    }

    /// Increment the count. If the count is still non-positive and a
    /// waiter is queued, dequeue the head waiter, mark it available, and
    /// yield to give it a prompt chance to run.
    pub fn up(&self) -> Result<()> {
        if !self.initialized.get() {
            return Err(ThreadError::Uninitialized);
        }

        self.value.set(self.value.get() + 1);
        trace!("sem {}: up -> {}", self.id.get(), self.value.get());

        if self.value.get() <= 0 {
            if let Some(waiter) = self.queue.borrow_mut().pop_front() {
                unsafe { (*waiter).set_available(true) };
                thread::yield_now()?;
            }
        }

        Ok(())
    }

    /// Release all wait-queue entries, reset the count, and mark
    /// uninitialized. Threads still queued at destruction time are not
    /// restored to availability — draining waiters first is the caller's
    /// responsibility, as the data model documents.
    pub fn destroy(&self) -> Result<()> {
        if !self.initialized.get() {
            return Err(ThreadError::Uninitialized);
        }

        self.queue.borrow_mut().clear();
        self.value.set(0);
        self.initialized.set(false);
        trace!("sem {}: destroyed", self.id.get());
        Ok(())
    }
}

impl Default for Sem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{create, init, join, yield_now};
    use std::os::raw::c_void;
    use std::sync::atomic::{AtomicI64, Ordering};

    // Like thread.rs's tests, these install a process-wide preemption
    // timer via thread::init and must run with `--test-threads=1`.

    #[test]
    fn create_rejects_values_outside_zero_or_one() {
        let sem = Sem::new();
        assert!(matches!(
            sem.create(2).unwrap_err(),
            ThreadError::InvalidArgument(_)
        ));
    }

    #[test]
    fn double_create_fails() {
        let sem = Sem::new();
        sem.create(1).unwrap();
        assert!(matches!(sem.create(0).unwrap_err(), ThreadError::AlreadyInitialized));
    }

    #[test]
    fn operations_on_uninitialized_semaphore_fail() {
        let sem = Sem::new();
        assert!(matches!(sem.down().unwrap_err(), ThreadError::Uninitialized));
        assert!(matches!(sem.up().unwrap_err(), ThreadError::Uninitialized));
        assert!(matches!(sem.destroy().unwrap_err(), ThreadError::Uninitialized));
    }

    static COUNTER: AtomicI64 = AtomicI64::new(0);

    extern "C" fn critical_section_worker(arg: *mut c_void) {
        let mutex = unsafe { &*(arg as *const Sem) };
        for _ in 0..5 {
            mutex.down().unwrap();
            let tmp = COUNTER.load(Ordering::SeqCst);
            yield_now().unwrap();
            COUNTER.store(tmp + 1, Ordering::SeqCst);
            mutex.up().unwrap();
            yield_now().unwrap();
        }
    }

    #[test]
    fn binary_semaphore_guards_mutual_exclusion() {
        COUNTER.store(0, Ordering::SeqCst);

        let mutex = Sem::new();
        mutex.create(1).unwrap();
        let mutex_ptr = &mutex as *const Sem as *mut c_void;

        let mut main = crate::thread::Thread::new();
        init(&mut main).unwrap();

        let mut t1 = crate::thread::Thread::new();
        let mut t2 = crate::thread::Thread::new();
        create(&mut t1, critical_section_worker, mutex_ptr).unwrap();
        create(&mut t2, critical_section_worker, mutex_ptr).unwrap();

        join(&t1).unwrap();
        join(&t2).unwrap();

        assert_eq!(COUNTER.load(Ordering::SeqCst), 10);

        mutex.destroy().unwrap();
        crate::thread::cleanup().unwrap();
    }
}
