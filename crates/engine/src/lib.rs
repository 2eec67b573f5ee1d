//! `curio-engine`: wiring and runtime for the reservation engine.
//!
//! Composes the catalog, reservation, selection and reconciliation
//! components behind one facade, owns runtime configuration, and runs
//! the background workers.

pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::{Engine, EngineError, Workers};

#[cfg(test)]
mod integration_tests;
