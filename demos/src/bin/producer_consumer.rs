//! S5: two producers and two consumers around a 5-slot ring buffer,
//! guarded by the classic three-semaphore pattern (`empty`, `full`,
//! `mutex`). `empty` and `full` are created at `{1, 0}` rather than at
//! the ring's capacity — this crate's semaphores only accept a binary
//! initial value — so at most one slot is ever "reserved" ahead of a
//! consumer at a time; the ring itself still holds up to five items.
use runtime::{create, init, join, yield_now, EntryArg, Sem, Thread};
use std::cell::UnsafeCell;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

const RING_SIZE: usize = 5;
const ITEMS_PER_PRODUCER: usize = 3;

struct Ring {
    slots: UnsafeCell<[i32; RING_SIZE]>,
    head: UnsafeCell<usize>,
    tail: UnsafeCell<usize>,
}

struct Shared {
    ring: Ring,
    empty: Sem,
    full: Sem,
    mutex: Sem,
}

static PRODUCED: AtomicUsize = AtomicUsize::new(0);
static CONSUMED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn producer(arg: EntryArg) {
    let shared = unsafe { &*(arg as *const Shared) };
    for _ in 0..ITEMS_PER_PRODUCER {
        shared.empty.down().unwrap();
        shared.mutex.down().unwrap();

        let item = PRODUCED.fetch_add(1, Ordering::SeqCst) as i32;
        unsafe {
            let tail = *shared.ring.tail.get();
            (*shared.ring.slots.get())[tail % RING_SIZE] = item;
            *shared.ring.tail.get() = tail + 1;
        }
        println!("produced {item}");

        shared.mutex.up().unwrap();
        shared.full.up().unwrap();
        yield_now().unwrap();
    }
}

extern "C" fn consumer(arg: EntryArg) {
    let shared = unsafe { &*(arg as *const Shared) };
    for _ in 0..ITEMS_PER_PRODUCER {
        shared.full.down().unwrap();
        shared.mutex.down().unwrap();

        let item = unsafe {
            let head = *shared.ring.head.get();
            let value = (*shared.ring.slots.get())[head % RING_SIZE];
            *shared.ring.head.get() = head + 1;
            value
        };
        CONSUMED.fetch_add(1, Ordering::SeqCst);
        println!("consumed {item}");

        shared.mutex.up().unwrap();
        shared.empty.up().unwrap();
        yield_now().unwrap();
    }
}

fn main() {
    let mut main_thread = Thread::new();
    init(&mut main_thread).unwrap();

    let shared = Shared {
        ring: Ring {
            slots: UnsafeCell::new([0; RING_SIZE]),
            head: UnsafeCell::new(0),
            tail: UnsafeCell::new(0),
        },
        empty: Sem::new(),
        full: Sem::new(),
        mutex: Sem::new(),
    };
    shared.empty.create(1).unwrap();
    shared.full.create(0).unwrap();
    shared.mutex.create(1).unwrap();
    let shared_ptr = &shared as *const Shared as *mut c_void;

    let mut p1 = Thread::new();
    let mut p2 = Thread::new();
    let mut c1 = Thread::new();
    let mut c2 = Thread::new();
    create(&mut p1, producer, shared_ptr).unwrap();
    create(&mut p2, producer, shared_ptr).unwrap();
    create(&mut c1, consumer, shared_ptr).unwrap();
    create(&mut c2, consumer, shared_ptr).unwrap();

    join(&p1).unwrap();
    join(&p2).unwrap();
    join(&c1).unwrap();
    join(&c2).unwrap();

    let total = 2 * ITEMS_PER_PRODUCER;
    assert_eq!(PRODUCED.load(Ordering::SeqCst), total);
    assert_eq!(CONSUMED.load(Ordering::SeqCst), total);

    shared.empty.destroy().unwrap();
    shared.full.destroy().unwrap();
    shared.mutex.destroy().unwrap();
    runtime::thread::cleanup().unwrap();
}
