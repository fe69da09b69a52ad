// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The backend mainloop lock and its monitor-style wait/signal.
//!
//! Every audio system has exactly one mainloop lock. Backend callbacks run with
//! it held; application threads take it through [`MainloopGuard`]. Waiting
//! releases the lock, blocks until some holder signals, and re-acquires it, so
//! callers always re-check their predicate in a loop.
//!
//! State guarded by the lock lives in a [`MainloopCell`], which only hands out
//! a mutable borrow in exchange for a mutable borrow of the guard. Calling
//! [`MainloopGuard::wait`] while such a borrow is alive is rejected by the
//! borrow checker.

use std::{
    cell::UnsafeCell,
    sync::{Condvar, Mutex, PoisonError},
};

/// A recursive-free lock with a condition variable, shared by one audio system.
///
/// # Safety
///
/// Implementors must provide mutual exclusion between `lock` and `unlock`, and
/// `wait` must atomically release the lock, block until `signal` is called and
/// re-acquire it before returning.
pub unsafe trait Mainloop: Send + Sync {
    fn lock(&self);

    /// # Safety
    ///
    /// The calling thread must hold the lock.
    unsafe fn unlock(&self);

    /// # Safety
    ///
    /// The calling thread must hold the lock.
    unsafe fn wait(&self);

    /// Wakes every thread blocked in [`Mainloop::wait`].
    fn signal(&self);
}

/// RAII ownership of the mainloop lock.
pub struct MainloopGuard<'a> {
    mainloop: &'a dyn Mainloop,
    owned: bool,
}

impl<'a> MainloopGuard<'a> {
    /// Blocks until the lock is acquired.
    pub fn lock(mainloop: &'a dyn Mainloop) -> Self {
        mainloop.lock();
        Self {
            mainloop,
            owned: true,
        }
    }

    /// Wraps a lock that the current thread already holds without taking it
    /// again. Dropping the returned guard does not unlock.
    ///
    /// # Safety
    ///
    /// The lock must be held for the whole lifetime of the guard, and no other
    /// guard created on this thread may be borrowing a [`MainloopCell`] at the
    /// same time. Backend callbacks satisfy both when they are invoked from the
    /// mainloop with the lock held and never synchronously from a native call.
    pub(crate) unsafe fn assume_locked(mainloop: &'a dyn Mainloop) -> Self {
        Self {
            mainloop,
            owned: false,
        }
    }

    /// Releases the lock, blocks until signalled and re-acquires it.
    ///
    /// Wakeups may be spurious.
    pub fn wait(&mut self) {
        unsafe { self.mainloop.wait() }
    }

    pub fn signal(&self) {
        self.mainloop.signal();
    }
}

impl Drop for MainloopGuard<'_> {
    fn drop(&mut self) {
        if self.owned {
            unsafe { self.mainloop.unlock() };
        }
    }
}

/// Data that may only be touched while the mainloop lock is held.
///
/// All cells of an audio system are guarded by that system's single mainloop.
pub struct MainloopCell<T> {
    value: UnsafeCell<T>,
}

// Safety: access to the value is serialized by the mainloop lock, which every
// borrow requires.
unsafe impl<T: Send> Send for MainloopCell<T> {}
unsafe impl<T: Send> Sync for MainloopCell<T> {}

impl<T> MainloopCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    /// Borrows the value for as long as the guard is mutably borrowed.
    pub fn get_mut<'g>(&'g self, _guard: &'g mut MainloopGuard<'_>) -> &'g mut T {
        // Safety: the guard proves the lock is held, and the exclusive borrow
        // of the guard prevents a second borrow or a wait while this one lives.
        unsafe { &mut *self.value.get() }
    }
}

#[derive(Debug, Default)]
struct SoftState {
    locked: bool,
    generation: u64,
}

/// An in-process [`Mainloop`] built on `std::sync`.
///
/// Used by the simulated backend, which has no native event loop of its own.
#[derive(Debug, Default)]
pub struct SoftMainloop {
    state: Mutex<SoftState>,
    changed: Condvar,
}

impl SoftMainloop {
    pub fn new() -> Self {
        Self::default()
    }
}

unsafe impl Mainloop for SoftMainloop {
    fn lock(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.locked {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.locked = true;
    }

    unsafe fn unlock(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.locked = false;
        self.changed.notify_all();
    }

    unsafe fn wait(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = state.generation;
        state.locked = false;
        self.changed.notify_all();
        while state.generation == generation || state.locked {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.locked = true;
    }

    fn signal(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation = state.generation.wrapping_add(1);
        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, mpsc},
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn guard_unlocks_on_drop() {
        let mainloop = SoftMainloop::new();
        {
            let _guard = MainloopGuard::lock(&mainloop);
            assert!(mainloop.state.lock().unwrap().locked);
        }
        assert!(!mainloop.state.lock().unwrap().locked);
    }

    #[test]
    fn assumed_guard_leaves_lock_held() {
        let mainloop = SoftMainloop::new();
        let _outer = MainloopGuard::lock(&mainloop);
        {
            let _inner = unsafe { MainloopGuard::assume_locked(&mainloop) };
        }
        assert!(mainloop.state.lock().unwrap().locked);
    }

    #[test]
    fn wait_releases_lock_until_signalled() {
        let mainloop = Arc::new(SoftMainloop::new());
        let cell = Arc::new(MainloopCell::new(0u32));
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let mainloop = mainloop.clone();
            let cell = cell.clone();
            thread::spawn(move || {
                let mut guard = MainloopGuard::lock(&*mainloop);
                tx.send(()).unwrap();
                while *cell.get_mut(&mut guard) == 0 {
                    guard.wait();
                }
                *cell.get_mut(&mut guard)
            })
        };

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        {
            // Only reachable once the waiter has released the lock in wait().
            let mut guard = MainloopGuard::lock(&*mainloop);
            *cell.get_mut(&mut guard) = 7;
            guard.signal();
        }

        assert_eq!(waiter.join().unwrap(), 7);
    }
}
