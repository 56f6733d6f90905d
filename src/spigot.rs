// SPDX-License-Identifier: MIT

//! A bounded single-producer single-consumer ring feeding a worker's
//! products to one consumer.
//!
//! The producer runs on a dedicated thread, repeatedly calling a fill
//! function over its private state and publishing the result into the
//! next free slot. Publication is synchronised per slot: the producer
//! stores the value, then sets the slot's ready flag with release
//! ordering; the consumer observes the flag with acquire ordering before
//! reading, establishing the required happens-before edge.
//!
//! The consumer can [`Spigot::pause`] the producer — waiting until it is
//! parked — discard everything in flight, hand it a fresh state with
//! [`Spigot::resume`], and continue. Products of the old state are never
//! observed after a resume.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::thread;

struct Slot<T> {
    ready: AtomicBool,
    value: std::cell::UnsafeCell<Option<T>>,
}

// SAFETY: a slot's value is only touched by the producer while `ready`
// is false and by the consumer while `ready` is true; the flag's
// release/acquire pair orders those accesses.
unsafe impl<T: Send> Sync for Slot<T> {}

struct Control<S> {
    /// Consumer wants the producer parked.
    pause_requested: bool,
    /// Producer acknowledges it is parked.
    parked: bool,
    /// Producer should exit.
    shutdown: bool,
    /// Fresh producer state installed by a resume.
    replacement: Option<S>,
}

struct Shared<T, S> {
    slots: Box<[Slot<T>]>,
    control: Mutex<Control<S>>,
    resumed: Condvar,
    parked: Condvar,
}

/// Bounded SPSC ring with a pausable producer thread.
pub struct Spigot<T: Send + 'static, S: Send + 'static> {
    shared: Arc<Shared<T, S>>,
    worker: Option<thread::JoinHandle<()>>,
    /// Consumer cursor; the producer keeps its own.
    tail: usize,
}

impl<T: Send + 'static, S: Send + 'static> Spigot<T, S> {
    /// Start a producer thread with the given state and fill function.
    /// `depth` is the ring size.
    pub fn new(
        depth: usize,
        state: S,
        mut fill: impl FnMut(&mut S) -> T + Send + 'static,
    ) -> Self {
        assert!(depth >= 1, "the ring needs at least one slot");

        let slots = (0..depth)
            .map(|_| Slot {
                ready: AtomicBool::new(false),
                value: std::cell::UnsafeCell::new(None),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let shared = Arc::new(Shared {
            slots,
            control: Mutex::new(Control {
                pause_requested: false,
                parked: false,
                shutdown: false,
                replacement: None,
            }),
            resumed: Condvar::new(),
            parked: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            let shared = worker_shared;
            let mut state = state;
            let mut head = 0usize;

            loop {
                // Park when asked; wake up with a possibly fresh state.
                {
                    let mut control = shared.control.lock().unwrap();
                    while control.pause_requested {
                        control.parked = true;
                        shared.parked.notify_one();
                        control = shared.resumed.wait(control).unwrap();
                    }
                    control.parked = false;
                    if control.shutdown {
                        return;
                    }
                    if let Some(fresh) = control.replacement.take() {
                        state = fresh;
                        head = 0;
                    }
                }

                let slot = &shared.slots[head % shared.slots.len()];
                if slot.ready.load(Ordering::Acquire) {
                    // Ring full: the consumer has not drained this slot
                    // yet. Yield and re-check the control state, so a
                    // pause cannot deadlock against a full ring.
                    thread::yield_now();
                    continue;
                }

                let value = fill(&mut state);
                // SAFETY: `ready` is false, so the consumer does not
                // touch this slot.
                unsafe { *slot.value.get() = Some(value) };
                slot.ready.store(true, Ordering::Release);
                head += 1;
            }
        });

        Spigot {
            shared,
            worker: Some(worker),
            tail: 0,
        }
    }

    /// Take the next product, blocking until the producer delivers it.
    pub fn next(&mut self) -> T {
        let slot = &self.shared.slots[self.tail % self.shared.slots.len()];
        while !slot.ready.load(Ordering::Acquire) {
            thread::yield_now();
        }

        // SAFETY: `ready` is true, so the producer does not touch this
        // slot until the flag is cleared below.
        let value = unsafe { (*slot.value.get()).take() };
        slot.ready.store(false, Ordering::Release);
        self.tail += 1;

        value.expect("a ready slot always holds a value")
    }

    /// Stop the producer and wait until it is parked. In-flight products
    /// stay in the ring until [`Spigot::resume`] discards them.
    pub fn pause(&mut self) {
        let mut control = self.shared.control.lock().unwrap();
        control.pause_requested = true;
        while !control.parked {
            control = self.shared.parked.wait(control).unwrap();
        }
    }

    /// Discard everything in flight and restart the producer with a
    /// fresh state. Must be called after [`Spigot::pause`].
    pub fn resume(&mut self, state: S) {
        let mut control = self.shared.control.lock().unwrap();
        assert!(control.parked, "resume requires a paused producer");

        // The producer is parked, so the consumer owns every slot.
        for slot in self.shared.slots.iter() {
            // SAFETY: parked producer; no concurrent access.
            unsafe { *slot.value.get() = None };
            slot.ready.store(false, Ordering::Release);
        }
        self.tail = 0;

        control.replacement = Some(state);
        control.pause_requested = false;
        drop(control);
        self.shared.resumed.notify_one();
    }
}

impl<T: Send + 'static, S: Send + 'static> Drop for Spigot<T, S> {
    fn drop(&mut self) {
        {
            let mut control = self.shared.control.lock().unwrap();
            control.shutdown = true;
            control.pause_requested = false;
        }
        self.shared.resumed.notify_one();

        // Unblock a producer spinning on a full ring.
        for slot in self.shared.slots.iter() {
            slot.ready.store(false, Ordering::Release);
        }

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
