//! `curio-selections`: checkout batches and their state machine.
//!
//! A selection groups a client's reserved items into one checkout
//! request and drives them through confirm → finalize/cancel →
//! (optionally) revert. Every multi-item movement is all-or-nothing: a
//! failure leaves every item exactly where it was and names the
//! offenders.

pub mod selection;
pub mod service;
pub mod store;

pub use selection::{MovementEntry, MovementEvent, Selection, SelectionStatus};
pub use service::{SelectionError, SelectionService};
pub use store::{InMemorySelectionStore, SelectionStore, SelectionStoreError};
