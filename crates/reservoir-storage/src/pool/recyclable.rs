//! Scope-bound wrapper around a checked-out handle.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use reservoir_core::sync::SharedLease;
use reservoir_core::{HandleId, Slot};

use super::state::PoolState;

/// A handle checked out of a [`HandlePool`](super::HandlePool).
///
/// Dropping it is the single end-of-use: the handle goes back on its slot's
/// free list (or is discarded if the pool forgot it meanwhile) and the
/// concurrency lease taken at check-out is returned, which is what lets a
/// pending drain proceed. Wrap it in an `Arc` to share it further.
pub struct RecyclableHandle<H: Send + Sync + 'static> {
    slot: Slot,
    id: HandleId,
    handle: Arc<H>,
    lease: SharedLease<PoolState<H>>,
}

impl<H: Send + Sync + 'static> RecyclableHandle<H> {
    pub(crate) fn new(
        slot: Slot,
        id: HandleId,
        handle: Arc<H>,
        lease: SharedLease<PoolState<H>>,
    ) -> Self {
        Self {
            slot,
            id,
            handle,
            lease,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The shared handle itself, e.g. for identity checks.
    pub fn shared(&self) -> &Arc<H> {
        &self.handle
    }

    /// Return the handle to the pool now.
    pub fn release(self) {}
}

impl<H: Send + Sync + 'static> Deref for RecyclableHandle<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H: Send + Sync + 'static> Drop for RecyclableHandle<H> {
    fn drop(&mut self) {
        let recycled = self
            .lease
            .write()
            .flow_back(self.slot, self.id, Arc::clone(&self.handle));
        if recycled {
            tracing::trace!(slot = self.slot, id = %self.id, "handle returned to free list");
        } else {
            tracing::debug!(slot = self.slot, id = %self.id, "discarded handle released");
        }
    }
}

impl<H: Send + Sync + 'static> fmt::Debug for RecyclableHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecyclableHandle")
            .field("slot", &self.slot)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
