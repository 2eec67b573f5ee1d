//! Reconciliation cycle.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use curio_catalog::{ItemStatusStore, ItemStoreError, LifecycleState};
use curio_core::ItemKey;

use crate::ledger::{LedgerClient, LedgerError};
use crate::lock::{LockError, LockStore};
use crate::review::{ReviewError, ReviewFlag, ReviewQueue};

/// Reconciliation tuning.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileConfig {
    /// Items examined per cycle, bounding cycle run time.
    pub batch: usize,
    /// Lock TTL; generous relative to a cycle so a live owner never
    /// loses the lock mid-cycle, but bounded so a crashed one does.
    pub lock_ttl: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch: 100,
            lock_ttl: Duration::minutes(10),
        }
    }
}

/// Reconciliation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Another instance is reconciling; a normal skip, not an alarm.
    #[error("another reconciliation instance is active")]
    LockContention,

    /// The Ledger could not be reached; cycle aborted cleanly,
    /// corrections already applied this cycle stand.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error(transparent)]
    Items(#[from] ItemStoreError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("reconciliation state unavailable: {0}")]
    Storage(String),
}

impl From<LockError> for ReconcileError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Contention { .. } => ReconcileError::LockContention,
            LockError::Storage => ReconcileError::Storage("lock store".to_string()),
        }
    }
}

impl From<LedgerError> for ReconcileError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(msg) => ReconcileError::LedgerUnavailable(msg),
        }
    }
}

/// Outcome of one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub visited: usize,
    /// Items forced `Unavailable` by Ledger truth.
    pub overridden: usize,
    /// Items flagged for manual review.
    pub flagged: usize,
    /// The cursor reached the end of the catalog and restarts next
    /// cycle.
    pub wrapped: bool,
}

/// Compares a bounded batch of items against the Ledger and repairs
/// drift.
///
/// Each per-item correction is independently idempotent, so a cycle
/// aborted by a Ledger outage leaves valid state behind. The cursor
/// persists across cycles so the whole catalog is eventually visited.
pub struct Reconciler {
    items: Arc<dyn ItemStatusStore>,
    ledger: Arc<dyn LedgerClient>,
    locks: Arc<dyn LockStore>,
    review: Arc<dyn ReviewQueue>,
    config: ReconcileConfig,
    owner: Uuid,
    cursor: Mutex<Option<ItemKey>>,
}

impl Reconciler {
    pub fn new(
        items: Arc<dyn ItemStatusStore>,
        ledger: Arc<dyn LedgerClient>,
        locks: Arc<dyn LockStore>,
        review: Arc<dyn ReviewQueue>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            items,
            ledger,
            locks,
            review,
            config,
            owner: Uuid::now_v7(),
            cursor: Mutex::new(None),
        }
    }

    /// This instance's lock identity.
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Run one lock-guarded reconciliation cycle.
    ///
    /// `LockContention` means another instance is live and this cycle
    /// is a no-op. The lock is never held across the decision to start:
    /// it is acquired first and released (or left to lapse) at the end.
    pub fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, ReconcileError> {
        self.locks.acquire(self.owner, self.config.lock_ttl, now)?;
        let result = self.reconcile_batch(now);
        let _ = self.locks.release(self.owner);
        result
    }

    fn reconcile_batch(&self, now: DateTime<Utc>) -> Result<CycleReport, ReconcileError> {
        let after = *self
            .cursor
            .lock()
            .map_err(|_| ReconcileError::Storage("cursor poisoned".to_string()))?;

        let page = self.items.page(after, self.config.batch)?;
        let mut report = CycleReport::default();

        for record in &page {
            // The Ledger round-trip happens outside any store guard.
            let disposition = self.ledger.disposition(record.key)?;

            if disposition.is_gone() {
                match record.lifecycle {
                    // Already consistent with a departed item.
                    LifecycleState::Sold | LifecycleState::Unavailable => {}
                    state => {
                        let overridden = self
                            .items
                            .force_unavailable(record.key, "ledger reports item removed/retired")?;
                        warn!(
                            key = %record.key,
                            overrode = %state,
                            was = %overridden,
                            "ledger override: item no longer in warehouse"
                        );
                        report.overridden += 1;
                    }
                }
            } else {
                // Ledger still carries the item. Never auto-revert an
                // internal sale; a sale with selection history may
                // simply not have reached the Ledger yet.
                let unexplained = match record.lifecycle {
                    LifecycleState::Sold => record.selection.is_none(),
                    LifecycleState::Unavailable => true,
                    _ => false,
                };
                if unexplained {
                    self.review.flag(ReviewFlag {
                        key: record.key,
                        internal: record.lifecycle,
                        ledger: disposition.as_ledger_state(),
                        note: "internal state says gone, ledger disagrees".to_string(),
                        flagged_at: now,
                    })?;
                    debug!(key = %record.key, internal = %record.lifecycle, "drift flagged for manual review");
                    report.flagged += 1;
                }
            }

            self.items
                .mark_reconciled(record.key, disposition.as_ledger_state(), now)?;
            report.visited += 1;
        }

        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| ReconcileError::Storage("cursor poisoned".to_string()))?;
        if page.len() < self.config.batch {
            *cursor = None;
            report.wrapped = true;
        } else {
            *cursor = page.last().map(|r| r.key);
        }

        info!(
            visited = report.visited,
            overridden = report.overridden,
            flagged = report.flagged,
            wrapped = report.wrapped,
            "reconciliation cycle complete"
        );
        Ok(report)
    }
}
