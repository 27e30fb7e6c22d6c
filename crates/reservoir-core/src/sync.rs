//! Two-tier locking for pool structures.
//!
//! A [`TwoTierLock`] pairs two reader/writer locks:
//!
//! 1. **Concurrency**: gates structural operations. Shared holders are
//!    counted leases that may outlive a lexical scope and move between
//!    threads (a checked-out handle carries one until it is released). The
//!    exclusive side waits until every lease has been returned.
//! 2. **Memory**: a `parking_lot::RwLock` around the protected value.
//!
//! Concurrency is always acquired before memory. The memory lock is only
//! reachable through a [`SharedLease`] or an [`ExclusiveGuard`], and the one
//! memory-only accessor, [`TwoTierLock::peek`], asserts in debug builds that
//! no concurrency acquisition happens while its guard is alive.
//!
//! The thread holding the exclusive side may take shared leases again, so
//! callbacks running under it can still read diagnostics.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

thread_local! {
    /// Number of memory guards alive on the current thread.
    static MEMORY_HELD: Cell<usize> = const { Cell::new(0) };
}

fn assert_no_memory_held() {
    #[cfg(debug_assertions)]
    {
        let held = MEMORY_HELD.with(Cell::get);
        assert!(
            held == 0,
            "Lock ordering violation: acquiring the concurrency lock while holding \
             {held} memory guard(s). Concurrency must be acquired before memory.",
        );
    }
}

#[derive(Debug, Default)]
struct ConcurrencyState {
    shared: usize,
    owner: Option<ThreadId>,
    depth: usize,
}

#[derive(Debug, Default)]
struct ConcurrencyLock {
    state: Mutex<ConcurrencyState>,
    changed: Condvar,
}

impl ConcurrencyLock {
    fn lock_shared(&self) {
        assert_no_memory_held();
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.owner.is_some_and(|owner| owner != me) {
            self.changed.wait(&mut state);
        }
        state.shared += 1;
    }

    fn unlock_shared(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.shared > 0, "unbalanced shared unlock");
        state.shared -= 1;
        if state.shared == 0 {
            self.changed.notify_all();
        }
    }

    fn lock_exclusive(&self) {
        assert_no_memory_held();
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.depth += 1;
            return;
        }
        while state.owner.is_some() || state.shared > 0 {
            self.changed.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth = 1;
    }

    fn unlock_exclusive(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.depth > 0, "unbalanced exclusive unlock");
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.changed.notify_all();
        }
    }
}

/// Concurrency lock over a memory-locked value of type `T`.
#[derive(Debug, Default)]
pub struct TwoTierLock<T> {
    concurrency: ConcurrencyLock,
    memory: RwLock<T>,
}

impl<T> TwoTierLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            concurrency: ConcurrencyLock::default(),
            memory: RwLock::new(value),
        }
    }

    /// Take a shared concurrency lease. Blocks only while another thread
    /// holds the exclusive side.
    pub fn share(self: &Arc<Self>) -> SharedLease<T> {
        self.concurrency.lock_shared();
        SharedLease {
            lock: Arc::clone(self),
        }
    }

    /// Take the exclusive side. Blocks until no shared lease is outstanding
    /// and no other thread holds it. Calling this while the current thread
    /// holds a lease never returns.
    pub fn exclusive(&self) -> ExclusiveGuard<'_, T> {
        self.concurrency.lock_exclusive();
        ExclusiveGuard { lock: self }
    }

    /// Memory-only read for plain diagnostics. Do not take the concurrency
    /// lock while the returned guard is alive.
    pub fn peek(&self) -> MemoryRead<'_, T> {
        MemoryRead::new(self.memory.read())
    }

    /// Number of outstanding shared leases.
    pub fn shared_count(&self) -> usize {
        self.concurrency.state.lock().shared
    }

    #[cfg(test)]
    fn is_exclusively_locked(&self) -> bool {
        self.concurrency.state.lock().owner.is_some()
    }
}

/// A shared concurrency lease. Released on drop; may be sent to other threads.
pub struct SharedLease<T> {
    lock: Arc<TwoTierLock<T>>,
}

impl<T> SharedLease<T> {
    pub fn read(&self) -> MemoryRead<'_, T> {
        MemoryRead::new(self.lock.memory.read())
    }

    pub fn write(&self) -> MemoryWrite<'_, T> {
        MemoryWrite::new(self.lock.memory.write())
    }
}

impl<T> Drop for SharedLease<T> {
    fn drop(&mut self) {
        self.lock.concurrency.unlock_shared();
    }
}

/// The exclusive side of the concurrency lock.
pub struct ExclusiveGuard<'a, T> {
    lock: &'a TwoTierLock<T>,
}

impl<T> ExclusiveGuard<'_, T> {
    pub fn read(&self) -> MemoryRead<'_, T> {
        MemoryRead::new(self.lock.memory.read())
    }

    pub fn write(&self) -> MemoryWrite<'_, T> {
        MemoryWrite::new(self.lock.memory.write())
    }
}

impl<T> Drop for ExclusiveGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.concurrency.unlock_exclusive();
    }
}

fn enter_memory() {
    MEMORY_HELD.with(|held| held.set(held.get() + 1));
}

fn leave_memory() {
    MEMORY_HELD.with(|held| held.set(held.get() - 1));
}

/// Read guard on the memory lock.
pub struct MemoryRead<'a, T> {
    guard: RwLockReadGuard<'a, T>,
}

impl<'a, T> MemoryRead<'a, T> {
    fn new(guard: RwLockReadGuard<'a, T>) -> Self {
        enter_memory();
        Self { guard }
    }
}

impl<T> Deref for MemoryRead<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for MemoryRead<'_, T> {
    fn drop(&mut self) {
        leave_memory();
    }
}

/// Write guard on the memory lock.
pub struct MemoryWrite<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
}

impl<'a, T> MemoryWrite<'a, T> {
    fn new(guard: RwLockWriteGuard<'a, T>) -> Self {
        enter_memory();
        Self { guard }
    }
}

impl<T> Deref for MemoryWrite<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for MemoryWrite<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for MemoryWrite<'_, T> {
    fn drop(&mut self) {
        leave_memory();
    }
}
