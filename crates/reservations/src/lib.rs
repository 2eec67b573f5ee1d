//! `curio-reservations`: cart-facing soft reservation with TTL.
//!
//! Maps cart operations onto the item status store's reservation
//! primitives and owns the sweep that returns abandoned reservations to
//! the pool. There is no reliance on clients ever removing items
//! themselves.

pub mod cart;
pub mod manager;
pub mod sweeper;

pub use cart::{Cart, CartEntry, CartStore, CartStoreError, InMemoryCartStore};
pub use manager::{ReservationError, ReservationManager, SweepReport};
pub use sweeper::SweeperWorker;
