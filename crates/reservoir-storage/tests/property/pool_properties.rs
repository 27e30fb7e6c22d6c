//! Property tests for handle pool bookkeeping.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use reservoir_core::config::PoolConfig;
use reservoir_core::errors::{PoolError, StorageError};
use reservoir_core::traits::HandleFactory;
use reservoir_core::Slot;
use reservoir_storage::{HandlePool, RecyclableHandle};

#[derive(Default)]
struct TokenFactory {
    created: AtomicUsize,
}

impl HandleFactory for TokenFactory {
    type Handle = usize;

    fn generate_handle(&self, _slot: Slot) -> Result<usize, StorageError> {
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }

    fn will_configure_handle(&self, _slot: Slot, _handle: &usize) -> Result<(), StorageError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    CheckOut(Slot),
    Release(usize),
    Purge,
    Blockade,
    Unblockade,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..3i32).prop_map(Op::CheckOut),
        3 => any::<usize>().prop_map(Op::Release),
        1 => Just(Op::Purge),
        1 => Just(Op::Blockade),
        1 => Just(Op::Unblockade),
    ]
}

const SLOTS: [Slot; 3] = [0, 1, 2];

proptest! {
    #[test]
    fn prop_counts_stay_consistent(
        capacity in 1usize..5,
        ops in prop::collection::vec(op_strategy(), 1..80),
    ) {
        let pool = HandlePool::new(TokenFactory::default(), &PoolConfig { max_handle_count: capacity });
        let mut held: Vec<RecyclableHandle<usize>> = Vec::new();

        for op in ops {
            match op {
                Op::CheckOut(slot) => {
                    let free_before = pool.free_handle_count(slot);
                    let created_before = pool.factory().created.load(Ordering::SeqCst);
                    let blockaded = pool.is_blockaded();
                    match pool.check_out(slot) {
                        Ok(handle) => {
                            prop_assert!(!blockaded);
                            let created_after = pool.factory().created.load(Ordering::SeqCst);
                            if free_before > 0 {
                                prop_assert_eq!(created_after, created_before);
                            } else {
                                prop_assert_eq!(created_after, created_before + 1);
                            }
                            held.push(handle);
                        }
                        Err(PoolError::Blockaded) => prop_assert!(blockaded),
                        Err(PoolError::LimitExceeded { .. }) => {
                            prop_assert_eq!(free_before, 0);
                            prop_assert_eq!(pool.active_handle_count(slot), capacity);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other}"),
                    }
                }
                Op::Release(index) => {
                    if !held.is_empty() {
                        let handle = held.swap_remove(index % held.len());
                        drop(handle);
                    }
                }
                Op::Purge => {
                    pool.purge();
                    for slot in SLOTS {
                        prop_assert_eq!(pool.free_handle_count(slot), 0);
                    }
                }
                Op::Blockade => pool.blockade(),
                Op::Unblockade => pool.unblockade(),
            }

            let mut total = 0;
            for slot in SLOTS {
                let active = pool.active_handle_count(slot);
                let held_here = held.iter().filter(|h| h.slot() == slot).count();
                prop_assert!(active <= capacity);
                prop_assert_eq!(active, held_here);
                total += active + pool.free_handle_count(slot);
            }
            prop_assert_eq!(pool.alive_handle_count(), total);

            let ids: HashSet<_> = held.iter().map(|h| h.id()).collect();
            prop_assert_eq!(ids.len(), held.len());
        }
    }

    #[test]
    fn prop_drain_leaves_nothing_alive(checkouts in prop::collection::vec(0..3i32, 0..20)) {
        let pool = HandlePool::new(TokenFactory::default(), &PoolConfig { max_handle_count: 8 });
        let mut held = Vec::new();
        for slot in checkouts {
            if let Ok(handle) = pool.check_out(slot) {
                held.push(handle);
            }
        }
        held.truncate(held.len() / 2);
        drop(held);

        let mut calls = 0;
        pool.drain(|| calls += 1);
        prop_assert_eq!(calls, 1);
        prop_assert_eq!(pool.alive_handle_count(), 0);
        for slot in SLOTS {
            prop_assert_eq!(pool.active_handle_count(slot), 0);
        }
        prop_assert!(pool.is_blockaded());
    }
}
