//! `curio-reconcile`: drift detection and repair against the Ledger.
//!
//! The Ledger is the ultimate authority on whether an item has
//! physically left inventory. A periodic, lock-guarded cycle compares
//! the item status store against it and corrects drift: retirement
//! overrides any internal state, while an internal sale the Ledger has
//! not caught up to is flagged for manual review, never auto-reverted.

pub mod ledger;
pub mod lock;
pub mod review;
pub mod service;
pub mod worker;

pub use ledger::{InMemoryLedger, LedgerClient, LedgerDisposition, LedgerError};
pub use lock::{InMemoryLockStore, LockError, LockStore, ReconciliationLock};
pub use review::{InMemoryReviewQueue, ReviewError, ReviewFlag, ReviewQueue};
pub use service::{CycleReport, ReconcileConfig, ReconcileError, Reconciler};
pub use worker::ReconcileWorker;
