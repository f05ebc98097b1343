//! S4: a binary semaphore used as a mutex guarding a shared counter.
//! Two threads each do five `{down; read; yield; write; up; yield}`
//! rounds; without the semaphore the interleaved read-modify-write would
//! lose updates, with it the final count is exactly ten.
use runtime::{create, init, join, yield_now, EntryArg, Sem, Thread};
use std::os::raw::c_void;
use std::sync::atomic::{AtomicI64, Ordering};

static COUNTER: AtomicI64 = AtomicI64::new(0);

extern "C" fn worker(arg: EntryArg) {
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

fn main() {
    let mut main_thread = Thread::new();
    init(&mut main_thread).unwrap();

    let mutex = Sem::new();
    mutex.create(1).unwrap();
    let mutex_ptr = &mutex as *const Sem as *mut c_void;

    let mut t1 = Thread::new();
    let mut t2 = Thread::new();
    create(&mut t1, worker, mutex_ptr).unwrap();
    create(&mut t2, worker, mutex_ptr).unwrap();

    join(&t1).unwrap();
    join(&t2).unwrap();

    let total = COUNTER.load(Ordering::SeqCst);
    println!("counter = {total}");
    assert_eq!(total, 10);

    mutex.destroy().unwrap();
    runtime::thread::cleanup().unwrap();
}
