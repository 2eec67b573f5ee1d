//! `curio-core`: shared foundation for the reservation engine.
//!
//! This crate contains **pure domain** primitives (no storage or
//! scheduling concerns): strongly-typed identifiers, the audit actor
//! model, and the shared error type.

pub mod actor;
pub mod error;
pub mod id;

pub use actor::Actor;
pub use error::{DomainError, DomainResult};
pub use id::{AdminId, ClientId, ItemKey, SelectionId};
