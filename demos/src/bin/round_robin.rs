//! S2: two threads under the scheduler, each looping three times printing
//! its id and yielding. Run with `RUNTIME_TRACE=1` to see scheduler
//! activity alongside the interleaved output.
use runtime::{create, init, join, yield_now, EntryArg, Thread};
use std::os::raw::c_void;

extern "C" fn worker_one(_arg: EntryArg) {
    for _ in 0..3 {
        println!("T1");
        yield_now().unwrap();
    }
}

extern "C" fn worker_two(_arg: EntryArg) {
    for _ in 0..3 {
        println!("T2");
        yield_now().unwrap();
    }
}

fn main() {
    let mut main_thread = Thread::new();
    init(&mut main_thread).unwrap();

    let mut t1 = Thread::new();
    let mut t2 = Thread::new();
    create(&mut t1, worker_one, std::ptr::null_mut::<c_void>()).unwrap();
    create(&mut t2, worker_two, std::ptr::null_mut::<c_void>()).unwrap();

    join(&t1).unwrap();
    join(&t2).unwrap();

    assert!(t1.is_finished());
    assert!(t2.is_finished());

    runtime::thread::cleanup().unwrap();
}
