//! S6: destroying the sole thread right after `init`, with no other
//! thread ever created, leaves the scheduler with an empty run queue and
//! still tears down cleanly.
use runtime::{destroy, init, thread, Thread};

fn main() {
    let mut main_thread = Thread::new();
    init(&mut main_thread).unwrap();

    destroy(&mut main_thread).unwrap();
    assert!(main_thread.is_finished());

    thread::cleanup().unwrap();
    println!("destroyed the only thread and cleaned up successfully");
}
