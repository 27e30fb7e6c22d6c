//! Slot-partitioned handle pool.
//!
//! Handles are created on demand by a [`HandleFactory`], reused last-freed
//! first, and discarded by `purge` or `drain`. Pool bookkeeping sits behind a
//! [`TwoTierLock`]: check-out, release, purge and blockade take shared
//! concurrency leases, drain takes the exclusive side. A checked-out handle
//! keeps its lease until released, so drain's exclusive acquisition is what
//! waits for the active count to reach zero.

mod recyclable;
mod state;

pub use recyclable::RecyclableHandle;

use std::sync::Arc;

use reservoir_core::config::PoolConfig;
use reservoir_core::errors::{PoolError, ReservoirError, ThreadedErrors};
use reservoir_core::sync::TwoTierLock;
use reservoir_core::traits::HandleFactory;
use reservoir_core::Slot;
use tracing::{debug, info, warn};

use state::PoolState;

pub struct HandlePool<F: HandleFactory> {
    factory: F,
    max_handle_count: usize,
    shared: Arc<TwoTierLock<PoolState<F::Handle>>>,
    errors: ThreadedErrors,
}

impl<F: HandleFactory> HandlePool<F> {
    pub fn new(factory: F, config: &PoolConfig) -> Self {
        Self {
            factory,
            max_handle_count: config.max_handle_count,
            shared: Arc::new(TwoTierLock::new(PoolState::default())),
            errors: ThreadedErrors::new(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn max_handle_count(&self) -> usize {
        self.max_handle_count
    }

    /// Check out a handle for `slot`.
    ///
    /// Reuses the most recently freed handle, otherwise creates and
    /// configures a new one while the slot is below capacity. Never waits
    /// for capacity or for a blockade to lift. Failures are also recorded
    /// as the calling thread's error.
    pub fn check_out(&self, slot: Slot) -> Result<RecyclableHandle<F::Handle>, PoolError> {
        let result = self.flow_out(slot);
        if let Err(e) = &result {
            warn!(slot, error = %e, "handle check-out failed");
            self.errors.record(e.clone());
        }
        result
    }

    fn flow_out(&self, slot: Slot) -> Result<RecyclableHandle<F::Handle>, PoolError> {
        let lease = self.shared.share();
        {
            let mut state = lease.write();
            if state.blockaded {
                return Err(PoolError::Blockaded);
            }
            if let Some((id, handle)) = state.take_free(slot) {
                drop(state);
                debug!(slot, %id, "reusing free handle");
                return Ok(RecyclableHandle::new(slot, id, handle, lease));
            }
            if state.occupancy(slot) >= self.max_handle_count {
                return Err(PoolError::LimitExceeded {
                    slot,
                    limit: self.max_handle_count,
                });
            }
            state.reserve(slot);
        }

        // Created outside the memory lock; the reservation holds the capacity.
        let handle = match self.generate(slot) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                lease.write().unreserve(slot);
                return Err(e);
            }
        };
        let id = lease.write().admit(slot, Arc::clone(&handle));
        debug!(slot, %id, "created handle");
        Ok(RecyclableHandle::new(slot, id, handle, lease))
    }

    fn generate(&self, slot: Slot) -> Result<F::Handle, PoolError> {
        let handle = self
            .factory
            .generate_handle(slot)
            .map_err(|e| PoolError::CreationFailed {
                slot,
                message: e.to_string(),
            })?;
        self.factory
            .will_configure_handle(slot, &handle)
            .map_err(|e| PoolError::ConfigurationFailed {
                slot,
                message: e.to_string(),
            })?;
        Ok(handle)
    }

    /// Make every subsequent check-out fail with [`PoolError::Blockaded`].
    pub fn blockade(&self) {
        let lease = self.shared.share();
        lease.write().blockaded = true;
        info!("handle pool blockaded");
    }

    pub fn unblockade(&self) {
        let lease = self.shared.share();
        lease.write().blockaded = false;
        info!("handle pool unblockaded");
    }

    pub fn is_blockaded(&self) -> bool {
        self.shared.peek().blockaded
    }

    /// Discard every free handle. Handles currently checked out stay alive
    /// and return to a fresh free list when released.
    pub fn purge(&self) {
        let lease = self.shared.share();
        let discarded = lease.write().clear_frees();
        drop(lease);
        info!(count = discarded.len(), "purged free handles");
    }

    /// Blockade the pool, wait until no handle is checked out, discard every
    /// handle, then call `on_drained` once. The pool stays blockaded.
    ///
    /// Blocks for as long as any handle stays checked out; a thread that
    /// drains while holding a handle itself never returns.
    pub fn drain<C: FnOnce()>(&self, on_drained: C) {
        self.blockade();
        self.purge();

        debug!(outstanding = self.shared.shared_count(), "waiting for checked-out handles");
        let guard = self.shared.exclusive();
        let discarded = {
            let mut state = guard.write();
            debug_assert_eq!(state.total_active_count(), 0);
            state.clear_all()
        };
        drop(discarded);
        info!("handle pool drained");
        on_drained();
    }

    /// Live handles across all slots.
    pub fn alive_handle_count(&self) -> usize {
        self.shared.peek().total_alive_count()
    }

    /// Handles of `slot` currently checked out.
    pub fn active_handle_count(&self, slot: Slot) -> usize {
        self.shared.peek().active_count(slot)
    }

    /// Idle handles of `slot` waiting on the free list.
    pub fn free_handle_count(&self, slot: Slot) -> usize {
        self.shared.peek().free_count(slot)
    }

    /// Snapshot of every live handle of `slot`, checked out or not.
    pub fn alive_handles(&self, slot: Slot) -> Vec<Arc<F::Handle>> {
        self.shared.peek().alive_handles(slot)
    }

    pub fn errors(&self) -> &ThreadedErrors {
        &self.errors
    }

    /// The last error recorded by the calling thread.
    pub fn thread_error(&self) -> Option<ReservoirError> {
        self.errors.thread_error()
    }
}
