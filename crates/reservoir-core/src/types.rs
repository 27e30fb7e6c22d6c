//! Slot and handle identifiers.

use std::fmt;

/// Caller-defined tag partitioning pooled handles by purpose.
///
/// The pool never enumerates slots, it only uses them as map keys.
pub type Slot = i32;

/// Conventional slots used by the storage crate.
pub mod slots {
    use super::Slot;

    /// Ordinary read/write traffic.
    pub const NORMAL: Slot = 0;
    /// Handles driven by the migration coordinator.
    pub const MIGRATION: Slot = 1;
}

/// Pool-unique identity of a live handle, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}
