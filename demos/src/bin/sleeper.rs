//! S3: a single thread sleeps for two seconds; main measures the elapsed
//! wall-clock time around the `join` and reports it.
use runtime::{create, init, join, sleep, EntryArg, Thread};
use std::os::raw::c_void;
use std::time::Instant;

extern "C" fn napper(_arg: EntryArg) {
    sleep(2).unwrap();
}

fn main() {
    let mut main_thread = Thread::new();
    init(&mut main_thread).unwrap();

    let mut t = Thread::new();
    let start = Instant::now();
    create(&mut t, napper, std::ptr::null_mut::<c_void>()).unwrap();
    join(&t).unwrap();
    let elapsed = start.elapsed();

    println!("slept for {:.3}s", elapsed.as_secs_f64());
    assert!(elapsed.as_secs_f64() >= 2.0);

    runtime::thread::cleanup().unwrap();
}
