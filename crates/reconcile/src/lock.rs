//! Cross-instance reconciliation lock.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The single mutual-exclusion record guaranteeing one reconciliation
/// run cluster-wide. Always time-bounded so a crashed owner cannot
/// deadlock the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationLock {
    pub owner: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReconciliationLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lock acquisition error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// Another instance holds an unexpired lock; the cycle is skipped.
    #[error("reconciliation lock held by {holder}")]
    Contention { holder: Uuid },

    #[error("lock store unavailable")]
    Storage,
}

/// Storage abstraction for the reconciliation lock.
pub trait LockStore: Send + Sync {
    /// Take the lock for `owner` with a fresh TTL.
    ///
    /// Succeeds when the lock is free, expired, or already held by the
    /// same owner (re-entrant extension). Compare-and-swap under one
    /// write guard, same idiom as item reservation.
    fn acquire(
        &self,
        owner: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationLock, LockError>;

    /// Drop the lock if held by `owner`; otherwise a no-op (the lock
    /// may have expired and been taken over).
    fn release(&self, owner: Uuid) -> Result<(), LockError>;
}

/// In-memory lock store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    lock: RwLock<Option<ReconciliationLock>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<ReconciliationLock> {
        self.lock.read().ok().and_then(|l| *l)
    }
}

impl LockStore for InMemoryLockStore {
    fn acquire(
        &self,
        owner: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationLock, LockError> {
        let mut slot = self.lock.write().map_err(|_| LockError::Storage)?;

        if let Some(held) = *slot {
            if held.owner != owner && !held.is_expired(now) {
                return Err(LockError::Contention { holder: held.owner });
            }
        }

        let lock = ReconciliationLock {
            owner,
            acquired_at: now,
            expires_at: now + ttl,
        };
        *slot = Some(lock);
        Ok(lock)
    }

    fn release(&self, owner: Uuid) -> Result<(), LockError> {
        let mut slot = self.lock.write().map_err(|_| LockError::Storage)?;
        if slot.is_some_and(|l| l.owner == owner) {
            *slot = None;
        }
        Ok(())
    }
}
