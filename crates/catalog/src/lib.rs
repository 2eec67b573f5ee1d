//! `curio-catalog`: item lifecycle model and status store.
//!
//! Single writable source for an item's lifecycle state. Every mutation
//! of item state in the system goes through the [`ItemStatusStore`]
//! operations defined here; no other component writes item state
//! directly.

pub mod item;
pub mod store;

pub use item::{ItemRecord, LedgerState, LifecycleState, Reservation};
pub use store::{
    AvailabilityFilter, BatchFailure, BatchFailureReason, InMemoryItemStatusStore,
    ItemStatusStore, ItemStoreError,
};
