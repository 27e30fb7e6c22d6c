//! Bookkeeping behind the pool's memory lock.

use std::sync::Arc;

use reservoir_core::{HandleId, Slot};
use rustc_hash::FxHashMap;

/// Alive set, free lists, reservations, and the blockade flag.
///
/// Every free handle is also alive in the same slot. Free lists are stacks:
/// the last handle pushed is the first reused.
pub(crate) struct PoolState<H> {
    handles: FxHashMap<Slot, FxHashMap<HandleId, Arc<H>>>,
    frees: FxHashMap<Slot, Vec<(HandleId, Arc<H>)>>,
    reserved: FxHashMap<Slot, usize>,
    pub(crate) blockaded: bool,
    next_id: u64,
}

impl<H> Default for PoolState<H> {
    fn default() -> Self {
        Self {
            handles: FxHashMap::default(),
            frees: FxHashMap::default(),
            reserved: FxHashMap::default(),
            blockaded: false,
            next_id: 0,
        }
    }
}

impl<H> PoolState<H> {
    pub(crate) fn take_free(&mut self, slot: Slot) -> Option<(HandleId, Arc<H>)> {
        self.frees.get_mut(&slot).and_then(Vec::pop)
    }

    /// Alive plus reserved handles for `slot`; what capacity is checked against.
    pub(crate) fn occupancy(&self, slot: Slot) -> usize {
        self.alive_count(slot) + self.reserved.get(&slot).copied().unwrap_or(0)
    }

    pub(crate) fn reserve(&mut self, slot: Slot) {
        *self.reserved.entry(slot).or_insert(0) += 1;
    }

    pub(crate) fn unreserve(&mut self, slot: Slot) {
        if let Some(count) = self.reserved.get_mut(&slot) {
            *count -= 1;
            if *count == 0 {
                self.reserved.remove(&slot);
            }
        }
    }

    /// Turn a reservation into a live handle.
    pub(crate) fn admit(&mut self, slot: Slot, handle: Arc<H>) -> HandleId {
        self.unreserve(slot);
        let id = HandleId(self.next_id);
        self.next_id += 1;
        self.handles.entry(slot).or_default().insert(id, handle);
        id
    }

    /// Put a released handle back on its free list. Returns `false` when the
    /// handle was discarded from the alive set while checked out.
    pub(crate) fn flow_back(&mut self, slot: Slot, id: HandleId, handle: Arc<H>) -> bool {
        let alive = self
            .handles
            .get(&slot)
            .is_some_and(|handles| handles.contains_key(&id));
        if alive {
            self.frees.entry(slot).or_default().push((id, handle));
        }
        alive
    }

    /// Empty every free list and forget those handles. Checked-out handles
    /// keep their alive entries. Returns the discarded handles so the caller
    /// can drop them outside the lock.
    pub(crate) fn clear_frees(&mut self) -> Vec<Arc<H>> {
        let mut discarded = Vec::new();
        for (slot, frees) in self.frees.drain() {
            let Some(handles) = self.handles.get_mut(&slot) else {
                continue;
            };
            for (id, handle) in frees {
                handles.remove(&id);
                discarded.push(handle);
            }
            if handles.is_empty() {
                self.handles.remove(&slot);
            }
        }
        discarded
    }

    /// Forget every handle, alive or free.
    pub(crate) fn clear_all(&mut self) -> Vec<Arc<H>> {
        self.frees.clear();
        self.handles
            .drain()
            .flat_map(|(_, handles)| handles.into_values())
            .collect()
    }

    pub(crate) fn alive_count(&self, slot: Slot) -> usize {
        self.handles.get(&slot).map_or(0, |handles| handles.len())
    }

    pub(crate) fn total_alive_count(&self) -> usize {
        self.handles.values().map(|handles| handles.len()).sum()
    }

    pub(crate) fn free_count(&self, slot: Slot) -> usize {
        self.frees.get(&slot).map_or(0, Vec::len)
    }

    pub(crate) fn active_count(&self, slot: Slot) -> usize {
        self.alive_count(slot) - self.free_count(slot)
    }

    pub(crate) fn total_active_count(&self) -> usize {
        self.handles
            .keys()
            .map(|&slot| self.active_count(slot))
            .sum()
    }

    pub(crate) fn alive_handles(&self, slot: Slot) -> Vec<Arc<H>> {
        self.handles
            .get(&slot)
            .map(|handles| handles.values().cloned().collect())
            .unwrap_or_default()
    }
}
