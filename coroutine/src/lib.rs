//! Stack-switching coroutine primitive.
//!
//! A [`CoCtx`] is a stack plus a saved machine context (stack pointer and
//! callee-saved registers) that can be resumed exactly where it last
//! suspended. This is the leaf layer: it knows nothing about threads,
//! scheduling, or semaphores — just how to own a stack and swap onto it.
//!
//! The implementation follows the same approach as this workspace's
//! `stackfull-coroutine` and `a-stack-swap` crates: a hand-written, naked
//! `switch` routine that saves/restores the stack pointer and the
//! SysV-ABI callee-saved registers, with the entry function's argument
//! threaded through one of those registers rather than passed normally,
//! since nothing sets up the usual argument registers across a bare `ret`.
#![feature(naked_functions)]

use std::arch::asm;
use std::io;
use std::os::raw::c_void;

/// Default stack size for a coroutine: 64 KiB.
///
/// Matches the thread layer's fixed-size stack requirement; callers that
/// only need the coroutine primitive directly may choose a different size
/// via [`CoCtx::with_stack_size`].
pub const STACK_SIZE: usize = 64 * 1024;

/// A single pointer-width argument passed to a coroutine's entry function.
pub type EntryArg = *mut c_void;

/// A coroutine's entry function: called once, with one opaque argument.
pub type EntryFn = extern "C" fn(EntryArg);

/// Saved CPU state: the stack pointer and the registers the x86-64 SysV
/// ABI requires a callee to preserve across a call. Everything else is
/// caller-saved and is the caller's problem, not ours.
#[derive(Debug, Default)]
#[repr(C)]
struct Registers {
    rsp: u64,
    r15: u64,
    r14: u64,
    r13: u64,
    r12: u64,
    rbx: u64,
    rbp: u64,
}

/// Packaged up arguments for a coroutine's first entry, handed to
/// [`trampoline_entry`] through a callee-saved register and consumed
/// exactly once by [`coroutine_entry`].
struct TrampolineArgs {
    body: EntryFn,
    arg: EntryArg,
    /// Where to resume if `body` returns instead of switching away
    /// explicitly. Borrowed for the coroutine's lifetime; the caller of
    /// `create` must ensure the linked context outlives `co`.
    link: *const Registers,
}

/// A coroutine: an owned stack and the machine context needed to resume
/// execution on it.
///
/// Created uninitialized (no stack, zeroed registers). Becomes usable
/// either by capturing the current execution point with [`CoCtx::init`]
/// (for the coroutine that represents "the program as it already is",
/// i.e. main) or by arming an entry function with [`CoCtx::create`].
pub struct CoCtx {
    stack: Vec<u8>,
    regs: Registers,
    stack_size: usize,
}

impl Default for CoCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl CoCtx {
    /// Create an uninitialized coroutine context with the default stack size.
    pub fn new() -> Self {
        Self::with_stack_size(STACK_SIZE)
    }

    /// Create an uninitialized coroutine context with a caller-chosen stack size.
    pub fn with_stack_size(stack_size: usize) -> Self {
        CoCtx {
            stack: Vec::new(),
            regs: Registers::default(),
            stack_size,
        }
    }

    /// Capture the caller's current machine context into `self`.
    ///
    /// Used for the coroutine that represents an already-running thread of
    /// control (typically the program's main thread): there is no stack to
    /// arm, only a resume point to remember. If something later switches
    /// into this context, execution resumes immediately after this call,
    /// as if it had just returned.
    ///
    /// Fails only if the underlying save primitive cannot run, which in
    /// practice does not happen on supported targets; the `Result` is kept
    /// so failures in less portable configurations have somewhere to go
    /// rather than panicking.
    pub fn init(&mut self) -> io::Result<()> {
        unsafe {
            let ctx: *mut Registers = &mut self.regs;
            asm!(
                "call raw_save",
                in("rdi") ctx,
                clobber_abi("C"),
            );
        }
        Ok(())
    }

    /// Arm `self` so that on first [`switchto`] it begins executing
    /// `body(arg)` on its own stack.
    ///
    /// If `body` returns without `self` ever calling [`switchto`] itself
    /// (i.e. without suspending), control implicitly transfers to `link`'s
    /// context, the same "uc_link" behavior `makecontext`/`swapcontext`
    /// provide. The caller must ensure `link` outlives `self`.
    ///
    /// # Safety
    /// `self` must not already be armed or in use by a running coroutine.
    /// `link` must remain valid for as long as `self` might be resumed.
    pub unsafe fn create(&mut self, body: EntryFn, arg: EntryArg, link: &CoCtx) -> io::Result<()> {
        if self.stack.is_empty() {
            self.stack = vec![0_u8; self.stack_size];
        }

        let args = Box::new(TrampolineArgs {
            body,
            arg,
            link: &link.regs as *const Registers,
        });
        let args_ptr = Box::into_raw(args) as u64;

        let size = self.stack.len();
        let stack_top = self.stack.as_mut_ptr().add(size);
        // Align down to a 16-byte boundary, then land 16 bytes below it so
        // that after `raw_switch`'s `ret` pops our entry address, rsp sits
        // at `16k - 8`, matching the SysV convention for rsp on function
        // entry (as if a normal `call` had just pushed a return address).
        let aligned = (stack_top as usize & !0xF) as *mut u8;
        std::ptr::write(aligned.offset(-16) as *mut u64, trampoline_entry as u64);

        self.regs = Registers {
            rsp: aligned.offset(-16) as u64,
            r12: args_ptr,
            ..Registers::default()
        };

        Ok(())
    }

    /// Release the stack. No cross-coroutine signaling happens; this is
    /// purely a local deallocation.
    pub fn destroy(&mut self) {
        self.stack = Vec::new();
    }

    /// Atomically save the running context into `from` and resume `to`.
    ///
    /// `from`'s stack bytes are left untouched between calls: when `from`
    /// is next switched back into, execution resumes exactly here.
    ///
    /// # Safety
    /// `to` must have been initialized via [`CoCtx::init`] or armed via
    /// [`CoCtx::create`]. Both contexts must remain valid (their stacks
    /// must not move or be dropped) until control returns to `from`.
    pub unsafe fn switchto(from: &mut CoCtx, to: &CoCtx) {
        let old_ctx: *mut Registers = &mut from.regs;
        let new_ctx: *const Registers = &to.regs;
        asm!(
            "call raw_switch",
            in("rdi") old_ctx,
            in("rsi") new_ctx,
            clobber_abi("C"),
        );
    }
}

/// Entry point written onto a freshly armed coroutine's stack. Runs with
/// the argument pointer handed to us by [`CoCtx::create`] in `r12`, since
/// nothing populates the usual argument registers across a bare `ret`.
#[naked]
unsafe extern "C" fn trampoline_entry() -> ! {
    asm!("mov rdi, r12", "call {entry}", entry = sym coroutine_entry, options(noreturn));
}

/// Ordinary (non-naked) continuation of [`trampoline_entry`]: consumes the
/// packaged entry arguments, runs the body, and falls through to `link`
/// if the body returns normally.
extern "C" fn coroutine_entry(args_ptr: EntryArg) -> ! {
    let args = unsafe { Box::from_raw(args_ptr as *mut TrampolineArgs) };
    let TrampolineArgs { body, arg, link } = *args;

    body(arg);

    // `body` returned instead of switching away explicitly: honor the
    // uc_link contract and transfer control to whatever was captured as
    // `link` at creation time. We never resume past this point, so the
    // scratch "from" context below is write-only.
    let mut scratch = Registers::default();
    unsafe {
        asm!(
            "call raw_switch",
            in("rdi") &mut scratch as *mut Registers,
            in("rsi") link,
            clobber_abi("C"),
        );
    }
    unreachable!("switched into a context that itself never resumed us")
}

// rdi = pointer to context to save into.
//
// Snapshots the stack pointer and callee-saved registers, then returns
// normally via `ret` — the coroutine equivalent of `getcontext`. Whatever
// later resumes this saved context will continue right after the `call`
// that reached here.
#[naked]
#[no_mangle]
#[cfg_attr(target_os = "macos", export_name = "\x01raw_save")]
unsafe extern "C" fn raw_save() {
    asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], r15",
        "mov [rdi + 0x10], r14",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], rbx",
        "mov [rdi + 0x30], rbp",
        "ret",
        options(noreturn)
    );
}

// rdi = pointer into 'old' context (save here)
// rsi = pointer into 'new' context (load from here)
//
// struct Registers {
//     rsp: u64,  [+0x00]
//     r15: u64,  [+0x08]
//     r14: u64,  [+0x10]
//     r13: u64,  [+0x18]
//     r12: u64,  [+0x20]
//     rbx: u64,  [+0x28]
//     rbp: u64,  [+0x30]
// }
#[naked]
#[no_mangle]
#[cfg_attr(target_os = "macos", export_name = "\x01raw_switch")]
unsafe extern "C" fn raw_switch() {
    asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], r15",
        "mov [rdi + 0x10], r14",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], rbx",
        "mov [rdi + 0x30], rbp",
        "mov rsp, [rsi + 0x00]",
        "mov r15, [rsi + 0x08]",
        "mov r14, [rsi + 0x10]",
        "mov r13, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov rbx, [rsi + 0x28]",
        "mov rbp, [rsi + 0x30]",
        "ret",
        options(noreturn)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static STEPS: AtomicU32 = AtomicU32::new(0);

    extern "C" fn count_and_return(_arg: EntryArg) {
        STEPS.fetch_add(1, Ordering::SeqCst);
    }

    /// A coroutine that runs once and falls through its `link` should hand
    /// control back to main without anyone calling `switchto` again.
    #[test]
    fn falls_through_to_link_on_return() {
        STEPS.store(0, Ordering::SeqCst);

        let mut main = CoCtx::new();
        main.init().unwrap();

        let mut worker = CoCtx::new();
        unsafe {
            worker.create(count_and_return, std::ptr::null_mut(), &main).unwrap();
            CoCtx::switchto(&mut main, &worker);
        }

        assert_eq!(STEPS.load(Ordering::SeqCst), 1);
    }

    fn test_send<T: Send>() {}

    #[test]
    fn co_ctx_is_send() {
        test_send::<CoCtx>();
    }
}
