//! Per-thread error sink.
//!
//! Each pool (or other error-prone object) owns one sink. Failing operations
//! record their error against the calling thread; a later call on the same
//! thread can read it back without the error crossing thread boundaries.
//!
//! Errors live in thread-local storage keyed by sink id, so a thread's
//! entries are freed when the thread exits.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::ReservoirError;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static THREAD_ERRORS: RefCell<FxHashMap<u64, Entry>> = RefCell::new(FxHashMap::default());
}

/// One recorded error; keeps its sink's live count in step.
struct Entry {
    error: ReservoirError,
    live: Arc<AtomicUsize>,
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct ThreadedErrors {
    id: u64,
    live: Arc<AtomicUsize>,
}

impl Default for ThreadedErrors {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadedErrors {
    pub fn new() -> Self {
        Self {
            id: NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record `error` as the calling thread's latest error.
    pub fn record(&self, error: impl Into<ReservoirError>) {
        let error = error.into();
        tracing::trace!(?error, "recording thread error");
        self.live.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            error,
            live: Arc::clone(&self.live),
        };
        // Fails only while the thread is tearing down; the entry is dropped.
        let _ = THREAD_ERRORS.try_with(|errors| errors.borrow_mut().insert(self.id, entry));
    }

    /// The latest error recorded by the calling thread, if any.
    pub fn thread_error(&self) -> Option<ReservoirError> {
        THREAD_ERRORS
            .try_with(|errors| errors.borrow().get(&self.id).map(|entry| entry.error.clone()))
            .ok()
            .flatten()
    }

    /// Number of live threads currently holding an error from this sink.
    pub fn recorded_threads(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

impl Drop for ThreadedErrors {
    fn drop(&mut self) {
        // Entries on other threads go when those threads exit.
        let _ = THREAD_ERRORS.try_with(|errors| errors.borrow_mut().remove(&self.id));
    }
}
