//! Capability interface injected into a handle pool.

use crate::errors::StorageError;
use crate::types::Slot;

/// Creates and configures the handles a pool hands out.
///
/// Different pools get different handle kinds by plugging in different
/// factories; the pool logic is generic over this trait.
pub trait HandleFactory: Send + Sync {
    /// The pooled handle type. Shared between the pool and the current holder.
    type Handle: Send + Sync + 'static;

    /// Produce a new handle for `slot`.
    ///
    /// Called with capacity for `slot` already reserved, so an implementation
    /// never needs to check the pool's limits itself.
    fn generate_handle(&self, slot: Slot) -> Result<Self::Handle, StorageError>;

    /// Prepare a freshly generated handle before its first use.
    /// An error discards the handle and fails the check-out.
    fn will_configure_handle(&self, slot: Slot, handle: &Self::Handle) -> Result<(), StorageError>;
}
