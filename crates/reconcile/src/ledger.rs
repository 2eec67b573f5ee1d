//! Ledger read contract.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use curio_catalog::LedgerState;
use curio_core::ItemKey;

/// Ledger-side view of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDisposition {
    /// The Ledger has a record of the item.
    pub exists: bool,
    /// The Ledger recorded the item as removed/retired.
    pub retired: bool,
    pub last_changed_at: Option<DateTime<Utc>>,
}

impl LedgerDisposition {
    pub fn present() -> Self {
        Self {
            exists: true,
            retired: false,
            last_changed_at: None,
        }
    }

    pub fn retired(at: DateTime<Utc>) -> Self {
        Self {
            exists: true,
            retired: true,
            last_changed_at: Some(at),
        }
    }

    pub fn absent() -> Self {
        Self {
            exists: false,
            retired: false,
            last_changed_at: None,
        }
    }

    /// The item has physically left inventory (or never was there).
    pub fn is_gone(&self) -> bool {
        !self.exists || self.retired
    }

    pub fn as_ledger_state(&self) -> LedgerState {
        if !self.exists {
            LedgerState::Absent
        } else if self.retired {
            LedgerState::Retired
        } else {
            LedgerState::Present
        }
    }
}

/// Ledger access error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The Ledger could not be reached; the cycle aborts cleanly and
    /// retries next interval. Never fatal to the rest of the system.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Read-only Ledger contract consumed by reconciliation.
pub trait LedgerClient: Send + Sync {
    fn disposition(&self, key: ItemKey) -> Result<LedgerDisposition, LedgerError>;
}

/// In-memory Ledger fake. Intended for tests/dev; items without an
/// entry are reported absent, and the whole ledger can be taken offline
/// to exercise failure paths.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: RwLock<HashMap<ItemKey, LedgerDisposition>>,
    offline: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: ItemKey, disposition: LedgerDisposition) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, disposition);
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }
}

impl LedgerClient for InMemoryLedger {
    fn disposition(&self, key: ItemKey) -> Result<LedgerDisposition, LedgerError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::Unavailable("lock poisoned".to_string()))?;
        Ok(entries.get(&key).copied().unwrap_or_else(LedgerDisposition::absent))
    }
}
