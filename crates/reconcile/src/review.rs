//! Manual-review queue for drift that must not be auto-repaired.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use curio_catalog::{LedgerState, LifecycleState};
use curio_core::ItemKey;

/// A drift case requiring human confirmation: the Ledger reports the
/// item present while the internal state says it left the pool. A
/// reconciliation job must never un-sell an item on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub key: ItemKey,
    pub internal: LifecycleState,
    pub ledger: LedgerState,
    pub note: String,
    pub flagged_at: DateTime<Utc>,
}

/// Review queue error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("review queue unavailable: {0}")]
    Storage(String),
}

/// Sink for flagged drift, consumed by the admin surface.
pub trait ReviewQueue: Send + Sync {
    /// Record or refresh the flag for an item.
    fn flag(&self, flag: ReviewFlag) -> Result<(), ReviewError>;

    fn pending(&self) -> Result<Vec<ReviewFlag>, ReviewError>;
}

/// In-memory review queue; one flag per item, refreshed on repeat
/// observations.
#[derive(Debug, Default)]
pub struct InMemoryReviewQueue {
    flags: RwLock<HashMap<ItemKey, ReviewFlag>>,
}

impl InMemoryReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewQueue for InMemoryReviewQueue {
    fn flag(&self, flag: ReviewFlag) -> Result<(), ReviewError> {
        let mut flags = self
            .flags
            .write()
            .map_err(|_| ReviewError::Storage("lock poisoned".to_string()))?;
        flags.insert(flag.key, flag);
        Ok(())
    }

    fn pending(&self) -> Result<Vec<ReviewFlag>, ReviewError> {
        let flags = self
            .flags
            .read()
            .map_err(|_| ReviewError::Storage("lock poisoned".to_string()))?;
        Ok(flags.values().cloned().collect())
    }
}
