//! S1: three coroutines hand-switching among each other directly, one
//! level below the scheduler — no run queue, just `CoCtx::switchto` calls
//! wired by hand, the way `stackfull-coroutine`'s own demo does it.
use coroutine::CoCtx;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicU32, Ordering};

static STEP: AtomicU32 = AtomicU32::new(0);

static mut MAIN: *mut CoCtx = std::ptr::null_mut();
static mut THREAD_A: *mut CoCtx = std::ptr::null_mut();
static mut THREAD_B: *mut CoCtx = std::ptr::null_mut();

fn bump() -> u32 {
    STEP.fetch_add(1, Ordering::SeqCst) + 1
}

extern "C" fn thread_a(_arg: *mut c_void) {
    unsafe {
        println!("{}", bump());
        CoCtx::switchto(&mut *THREAD_A, &*THREAD_B);
        println!("{}", bump());
        CoCtx::switchto(&mut *THREAD_A, &*MAIN);
    }
}

extern "C" fn thread_b(_arg: *mut c_void) {
    unsafe {
        println!("{}", bump());
        CoCtx::switchto(&mut *THREAD_B, &*THREAD_A);
        println!("{}", bump());
        CoCtx::switchto(&mut *THREAD_B, &*MAIN);
    }
}

fn main() {
    let mut main_ctx = CoCtx::new();
    let mut a_ctx = CoCtx::new();
    let mut b_ctx = CoCtx::new();
    main_ctx.init().unwrap();

    unsafe {
        MAIN = &mut main_ctx;
        THREAD_A = &mut a_ctx;
        THREAD_B = &mut b_ctx;

        a_ctx.create(thread_a, std::ptr::null_mut(), &main_ctx).unwrap();
        b_ctx.create(thread_b, std::ptr::null_mut(), &main_ctx).unwrap();

        CoCtx::switchto(&mut main_ctx, &a_ctx);
        CoCtx::switchto(&mut main_ctx, &b_ctx);
    }

    assert_eq!(STEP.load(Ordering::SeqCst), 4);
}
