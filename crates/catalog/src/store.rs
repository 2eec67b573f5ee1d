//! Item status store: trait and in-memory implementation.
//!
//! The store is the only component permitted to write item lifecycle
//! state. All operations are atomic per item: the in-memory
//! implementation checks and writes under a single write-lock
//! acquisition, which gives `try_reserve` compare-and-swap semantics
//! against concurrent callers and makes the batch operations
//! all-or-nothing (every item is prechecked before any is touched).

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use curio_core::{Actor, ClientId, ItemKey, SelectionId};

use crate::item::{ItemRecord, LedgerState, LifecycleState, Reservation};

/// Why one item in a batch operation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BatchFailureReason {
    NotFound,
    NotHeld,
    ReservationExpired,
    WrongState {
        expected: LifecycleState,
        actual: LifecycleState,
    },
}

/// One item that caused a batch operation to abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub key: ItemKey,
    pub reason: BatchFailureReason,
}

impl core::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.reason {
            BatchFailureReason::NotFound => write!(f, "{}: not found", self.key),
            BatchFailureReason::NotHeld => write!(f, "{}: not held by caller", self.key),
            BatchFailureReason::ReservationExpired => {
                write!(f, "{}: reservation expired", self.key)
            }
            BatchFailureReason::WrongState { expected, actual } => {
                write!(f, "{}: expected {expected}, found {actual}", self.key)
            }
        }
    }
}

/// Item store operation error.
///
/// Deterministic, caller-recoverable outcomes (`Conflict`, `NotHeld`,
/// `InvalidTransition`) are separate variants so collaborators can
/// render precise messages instead of a generic error page.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ItemStoreError {
    /// The item is held by someone else or otherwise not reservable.
    #[error("item {key} is not reservable (state {state})")]
    Conflict { key: ItemKey, state: LifecycleState },

    /// A release was attempted by a caller that does not hold the
    /// reservation; indicates stale client state.
    #[error("reservation on item {key} is not held by the caller")]
    NotHeld { key: ItemKey },

    /// The item's current state no longer matches what the operation
    /// assumed (e.g. a Ledger override occurred mid-flow).
    #[error("invalid transition on item {key}: expected {expected}, found {actual}")]
    InvalidTransition {
        key: ItemKey,
        expected: LifecycleState,
        actual: LifecycleState,
    },

    /// The requested edge is not part of the lifecycle at all.
    #[error("transition {from} -> {to} is not part of the item lifecycle")]
    UnsupportedTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("item {key} not found")]
    NotFound { key: ItemKey },

    #[error("item {key} is already registered")]
    AlreadyRegistered { key: ItemKey },

    /// A multi-item operation aborted; no item was modified.
    #[error("batch rejected, {} item(s) failed", failed.len())]
    BatchRejected { failed: Vec<BatchFailure> },

    #[error("item store unavailable: {0}")]
    Storage(String),
}

/// Filter for the read-only availability view consumed by the
/// catalog/gallery listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvailabilityFilter {
    /// Only items registered after this instant.
    pub registered_after: Option<DateTime<Utc>>,
    /// Cap on the number of records returned.
    pub limit: Option<usize>,
}

/// Single writable source for item lifecycle state.
///
/// Implementations must:
/// - make `try_reserve` linearizable per item (exactly one of N
///   concurrent distinct holders succeeds)
/// - reclaim on expiry by timestamp, never by presence, so a renewed
///   reservation is left untouched by a racing sweep
/// - make `claim_for_selection` and `transition_many` all-or-nothing:
///   on failure no item in the batch is modified and the error names
///   every offending item
pub trait ItemStatusStore: Send + Sync {
    /// Add a newly ingested item in `Available` state.
    fn register(&self, record: ItemRecord) -> Result<(), ItemStoreError>;

    fn get(&self, key: ItemKey) -> Result<ItemRecord, ItemStoreError>;

    /// Reserve the item for `holder` with a fresh TTL.
    ///
    /// Succeeds from `Available`, from an expired `Reserved`, or as a
    /// renewal by the current holder. Any other state is a `Conflict`
    /// with no side effect; a live reservation is never silently
    /// reassigned.
    fn try_reserve(
        &self,
        key: ItemKey,
        holder: ClientId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Reservation, ItemStoreError>;

    /// Clear a reservation held by `holder`, returning the item to
    /// `Available`.
    fn release(&self, key: ItemKey, holder: ClientId) -> Result<(), ItemStoreError>;

    /// Lazily reclaim an item whose reservation deadline has passed.
    ///
    /// Idempotent and callable by any reader; returns `true` only when
    /// this call performed the reclaim.
    fn expire_if_due(&self, key: ItemKey, now: DateTime<Utc>) -> Result<bool, ItemStoreError>;

    /// Guarded state change: fails with `InvalidTransition` when the
    /// current state differs from `from` (stale-state detection).
    ///
    /// `Reserved` cannot be a target here; a reservation carries a
    /// holder and TTL and is only created through `try_reserve`.
    fn transition(
        &self,
        key: ItemKey,
        from: LifecycleState,
        to: LifecycleState,
        actor: Actor,
    ) -> Result<(), ItemStoreError>;

    /// Atomically move a client's reserved items into
    /// `PendingCheckout`, stamping the claiming selection.
    ///
    /// Verifies for every item that `holder` currently holds an
    /// unexpired reservation; if any check fails the whole batch is
    /// rejected with the per-item reasons and nothing is modified.
    fn claim_for_selection(
        &self,
        keys: &[ItemKey],
        holder: ClientId,
        selection: SelectionId,
        now: DateTime<Utc>,
    ) -> Result<(), ItemStoreError>;

    /// Atomically apply the same guarded transition to every item.
    fn transition_many(
        &self,
        keys: &[ItemKey],
        from: LifecycleState,
        to: LifecycleState,
        actor: Actor,
    ) -> Result<(), ItemStoreError>;

    /// Ledger-driven absorbing override; bypasses the transition table.
    /// Returns the state that was overridden, for drift logging.
    fn force_unavailable(
        &self,
        key: ItemKey,
        reason: &str,
    ) -> Result<LifecycleState, ItemStoreError>;

    /// Read-only purchasable view for the gallery listing.
    fn list_available(
        &self,
        filter: &AvailabilityFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, ItemStoreError>;

    /// Key-ordered page of records for bounded reconciliation batches.
    fn page(
        &self,
        after: Option<ItemKey>,
        limit: usize,
    ) -> Result<Vec<ItemRecord>, ItemStoreError>;

    /// Record the Ledger disposition observed by a reconciliation pass.
    fn mark_reconciled(
        &self,
        key: ItemKey,
        ledger_state: LedgerState,
        now: DateTime<Utc>,
    ) -> Result<(), ItemStoreError>;
}

impl<S> ItemStatusStore for Arc<S>
where
    S: ItemStatusStore + ?Sized,
{
    fn register(&self, record: ItemRecord) -> Result<(), ItemStoreError> {
        (**self).register(record)
    }

    fn get(&self, key: ItemKey) -> Result<ItemRecord, ItemStoreError> {
        (**self).get(key)
    }

    fn try_reserve(
        &self,
        key: ItemKey,
        holder: ClientId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Reservation, ItemStoreError> {
        (**self).try_reserve(key, holder, ttl, now)
    }

    fn release(&self, key: ItemKey, holder: ClientId) -> Result<(), ItemStoreError> {
        (**self).release(key, holder)
    }

    fn expire_if_due(&self, key: ItemKey, now: DateTime<Utc>) -> Result<bool, ItemStoreError> {
        (**self).expire_if_due(key, now)
    }

    fn transition(
        &self,
        key: ItemKey,
        from: LifecycleState,
        to: LifecycleState,
        actor: Actor,
    ) -> Result<(), ItemStoreError> {
        (**self).transition(key, from, to, actor)
    }

    fn claim_for_selection(
        &self,
        keys: &[ItemKey],
        holder: ClientId,
        selection: SelectionId,
        now: DateTime<Utc>,
    ) -> Result<(), ItemStoreError> {
        (**self).claim_for_selection(keys, holder, selection, now)
    }

    fn transition_many(
        &self,
        keys: &[ItemKey],
        from: LifecycleState,
        to: LifecycleState,
        actor: Actor,
    ) -> Result<(), ItemStoreError> {
        (**self).transition_many(keys, from, to, actor)
    }

    fn force_unavailable(
        &self,
        key: ItemKey,
        reason: &str,
    ) -> Result<LifecycleState, ItemStoreError> {
        (**self).force_unavailable(key, reason)
    }

    fn list_available(
        &self,
        filter: &AvailabilityFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, ItemStoreError> {
        (**self).list_available(filter, now)
    }

    fn page(
        &self,
        after: Option<ItemKey>,
        limit: usize,
    ) -> Result<Vec<ItemRecord>, ItemStoreError> {
        (**self).page(after, limit)
    }

    fn mark_reconciled(
        &self,
        key: ItemKey,
        ledger_state: LedgerState,
        now: DateTime<Utc>,
    ) -> Result<(), ItemStoreError> {
        (**self).mark_reconciled(key, ledger_state, now)
    }
}

/// In-memory item status store.
///
/// Intended for tests/dev and as the reference semantics for durable
/// backends. Keyed by `ItemKey` in a `BTreeMap` so `page` is stable.
#[derive(Debug, Default)]
pub struct InMemoryItemStatusStore {
    items: RwLock<BTreeMap<ItemKey, ItemRecord>>,
}

impl InMemoryItemStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<ItemKey, ItemRecord>>, ItemStoreError>
    {
        self.items
            .read()
            .map_err(|_| ItemStoreError::Storage("lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<ItemKey, ItemRecord>>, ItemStoreError>
    {
        self.items
            .write()
            .map_err(|_| ItemStoreError::Storage("lock poisoned".to_string()))
    }

    /// Field effects shared by `transition` and `transition_many`.
    fn apply_transition(record: &mut ItemRecord, to: LifecycleState) {
        record.lifecycle = to;
        match to {
            // Back in the pool: no claim of any kind survives.
            LifecycleState::Available => {
                record.reservation = None;
                record.selection = None;
            }
            // Sold implies no active reservation; the selection link
            // stays as sale history.
            LifecycleState::Sold => {
                record.reservation = None;
            }
            _ => {}
        }
    }
}

impl ItemStatusStore for InMemoryItemStatusStore {
    fn register(&self, record: ItemRecord) -> Result<(), ItemStoreError> {
        let mut items = self.write()?;
        if items.contains_key(&record.key) {
            return Err(ItemStoreError::AlreadyRegistered { key: record.key });
        }
        debug!(key = %record.key, "item registered");
        items.insert(record.key, record);
        Ok(())
    }

    fn get(&self, key: ItemKey) -> Result<ItemRecord, ItemStoreError> {
        let items = self.read()?;
        items
            .get(&key)
            .cloned()
            .ok_or(ItemStoreError::NotFound { key })
    }

    fn try_reserve(
        &self,
        key: ItemKey,
        holder: ClientId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Reservation, ItemStoreError> {
        let mut items = self.write()?;
        let record = items
            .get_mut(&key)
            .ok_or(ItemStoreError::NotFound { key })?;

        match record.lifecycle {
            LifecycleState::Available => {}
            LifecycleState::Reserved => match &record.reservation {
                // Explicit renewal by the current holder.
                Some(r) if r.holder == holder => {}
                // Expired claims are up for grabs.
                Some(r) if r.is_expired(now) => {}
                Some(_) => {
                    return Err(ItemStoreError::Conflict {
                        key,
                        state: record.lifecycle,
                    });
                }
                None => {}
            },
            state => return Err(ItemStoreError::Conflict { key, state }),
        }

        let reservation = Reservation::new(holder, ttl, now);
        record.lifecycle = LifecycleState::Reserved;
        record.reservation = Some(reservation);
        record.selection = None;
        debug!(key = %key, holder = %holder, expires_at = %reservation.expires_at, "item reserved");
        Ok(reservation)
    }

    fn release(&self, key: ItemKey, holder: ClientId) -> Result<(), ItemStoreError> {
        let mut items = self.write()?;
        let record = items
            .get_mut(&key)
            .ok_or(ItemStoreError::NotFound { key })?;

        let held = record.lifecycle == LifecycleState::Reserved
            && record.reservation.is_some_and(|r| r.holder == holder);
        if !held {
            return Err(ItemStoreError::NotHeld { key });
        }

        Self::apply_transition(record, LifecycleState::Available);
        debug!(key = %key, holder = %holder, "reservation released");
        Ok(())
    }

    fn expire_if_due(&self, key: ItemKey, now: DateTime<Utc>) -> Result<bool, ItemStoreError> {
        let mut items = self.write()?;
        let record = items
            .get_mut(&key)
            .ok_or(ItemStoreError::NotFound { key })?;

        // Timestamp check, not presence: a reservation renewed or
        // re-acquired since the caller observed it has a fresh deadline
        // and is left untouched.
        let due = record.lifecycle == LifecycleState::Reserved
            && record.reservation.is_some_and(|r| r.is_expired(now));
        if !due {
            return Ok(false);
        }

        Self::apply_transition(record, LifecycleState::Available);
        debug!(key = %key, "expired reservation reclaimed");
        Ok(true)
    }

    fn transition(
        &self,
        key: ItemKey,
        from: LifecycleState,
        to: LifecycleState,
        actor: Actor,
    ) -> Result<(), ItemStoreError> {
        if to == LifecycleState::Reserved || !from.can_transition_to(to) {
            return Err(ItemStoreError::UnsupportedTransition { from, to });
        }

        let mut items = self.write()?;
        let record = items
            .get_mut(&key)
            .ok_or(ItemStoreError::NotFound { key })?;

        if record.lifecycle != from {
            return Err(ItemStoreError::InvalidTransition {
                key,
                expected: from,
                actual: record.lifecycle,
            });
        }

        Self::apply_transition(record, to);
        debug!(key = %key, %from, %to, %actor, "item transitioned");
        Ok(())
    }

    fn claim_for_selection(
        &self,
        keys: &[ItemKey],
        holder: ClientId,
        selection: SelectionId,
        now: DateTime<Utc>,
    ) -> Result<(), ItemStoreError> {
        let mut items = self.write()?;

        // Precheck every item before touching any.
        let mut failed = Vec::new();
        for &key in keys {
            let reason = match items.get(&key) {
                None => Some(BatchFailureReason::NotFound),
                Some(record) if record.lifecycle != LifecycleState::Reserved => {
                    Some(BatchFailureReason::WrongState {
                        expected: LifecycleState::Reserved,
                        actual: record.lifecycle,
                    })
                }
                Some(record) => match &record.reservation {
                    Some(r) if r.holder != holder => Some(BatchFailureReason::NotHeld),
                    Some(r) if r.is_expired(now) => Some(BatchFailureReason::ReservationExpired),
                    Some(_) => None,
                    None => Some(BatchFailureReason::NotHeld),
                },
            };
            if let Some(reason) = reason {
                failed.push(BatchFailure { key, reason });
            }
        }
        if !failed.is_empty() {
            return Err(ItemStoreError::BatchRejected { failed });
        }

        for &key in keys {
            // Precheck guarantees presence.
            if let Some(record) = items.get_mut(&key) {
                record.lifecycle = LifecycleState::PendingCheckout;
                record.selection = Some(selection);
            }
        }
        debug!(holder = %holder, selection = %selection, count = keys.len(), "items claimed for selection");
        Ok(())
    }

    fn transition_many(
        &self,
        keys: &[ItemKey],
        from: LifecycleState,
        to: LifecycleState,
        actor: Actor,
    ) -> Result<(), ItemStoreError> {
        if to == LifecycleState::Reserved || !from.can_transition_to(to) {
            return Err(ItemStoreError::UnsupportedTransition { from, to });
        }

        let mut items = self.write()?;

        let mut failed = Vec::new();
        for &key in keys {
            match items.get(&key) {
                None => failed.push(BatchFailure {
                    key,
                    reason: BatchFailureReason::NotFound,
                }),
                Some(record) if record.lifecycle != from => failed.push(BatchFailure {
                    key,
                    reason: BatchFailureReason::WrongState {
                        expected: from,
                        actual: record.lifecycle,
                    },
                }),
                Some(_) => {}
            }
        }
        if !failed.is_empty() {
            return Err(ItemStoreError::BatchRejected { failed });
        }

        for &key in keys {
            if let Some(record) = items.get_mut(&key) {
                Self::apply_transition(record, to);
            }
        }
        debug!(%from, %to, %actor, count = keys.len(), "batch transitioned");
        Ok(())
    }

    fn force_unavailable(
        &self,
        key: ItemKey,
        reason: &str,
    ) -> Result<LifecycleState, ItemStoreError> {
        let mut items = self.write()?;
        let record = items
            .get_mut(&key)
            .ok_or(ItemStoreError::NotFound { key })?;

        let overridden = record.lifecycle;
        record.lifecycle = LifecycleState::Unavailable;
        record.reservation = None;
        warn!(key = %key, overrode = %overridden, reason, "item forced unavailable");
        Ok(overridden)
    }

    fn list_available(
        &self,
        filter: &AvailabilityFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, ItemStoreError> {
        let items = self.read()?;
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(items
            .values()
            .filter(|r| r.is_purchasable(now))
            .filter(|r| {
                filter
                    .registered_after
                    .is_none_or(|after| r.registered_at > after)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    fn page(
        &self,
        after: Option<ItemKey>,
        limit: usize,
    ) -> Result<Vec<ItemRecord>, ItemStoreError> {
        let items = self.read()?;
        let page: Vec<ItemRecord> = match after {
            Some(after) => items
                .range((
                    std::ops::Bound::Excluded(after),
                    std::ops::Bound::Unbounded,
                ))
                .take(limit)
                .map(|(_, r)| r.clone())
                .collect(),
            None => items.values().take(limit).cloned().collect(),
        };
        Ok(page)
    }

    fn mark_reconciled(
        &self,
        key: ItemKey,
        ledger_state: LedgerState,
        now: DateTime<Utc>,
    ) -> Result<(), ItemStoreError> {
        let mut items = self.write()?;
        let record = items
            .get_mut(&key)
            .ok_or(ItemStoreError::NotFound { key })?;
        record.ledger_state = Some(ledger_state);
        record.last_reconciled_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ttl() -> Duration {
        Duration::seconds(60)
    }

    fn seeded(keys: &[ItemKey], now: DateTime<Utc>) -> InMemoryItemStatusStore {
        let store = InMemoryItemStatusStore::new();
        for &key in keys {
            store.register(ItemRecord::new(key, now)).unwrap();
        }
        store
    }

    #[test]
    fn reserve_then_conflict_for_other_holder() {
        let key = ItemKey::new();
        let now = Utc::now();
        let store = seeded(&[key], now);

        let a = ClientId::new();
        let b = ClientId::new();

        store.try_reserve(key, a, ttl(), now).unwrap();
        let err = store.try_reserve(key, b, ttl(), now).unwrap_err();
        assert!(matches!(err, ItemStoreError::Conflict { .. }));

        // The loser caused no side effect.
        let rec = store.get(key).unwrap();
        assert_eq!(rec.reservation.unwrap().holder, a);
    }

    #[test]
    fn expired_reservation_can_be_taken_over() {
        let key = ItemKey::new();
        let t0 = Utc::now();
        let store = seeded(&[key], t0);

        let a = ClientId::new();
        let b = ClientId::new();

        store.try_reserve(key, a, ttl(), t0).unwrap();
        let t1 = t0 + Duration::seconds(61);
        let r = store.try_reserve(key, b, ttl(), t1).unwrap();
        assert_eq!(r.holder, b);
        assert_eq!(r.expires_at, t1 + ttl());
    }

    #[test]
    fn holder_renewal_refreshes_deadline() {
        let key = ItemKey::new();
        let t0 = Utc::now();
        let store = seeded(&[key], t0);
        let a = ClientId::new();

        store.try_reserve(key, a, ttl(), t0).unwrap();
        let t1 = t0 + Duration::seconds(30);
        let renewed = store.try_reserve(key, a, ttl(), t1).unwrap();
        assert_eq!(renewed.expires_at, t1 + ttl());
    }

    #[test]
    fn release_requires_holder() {
        let key = ItemKey::new();
        let now = Utc::now();
        let store = seeded(&[key], now);
        let a = ClientId::new();
        let b = ClientId::new();

        store.try_reserve(key, a, ttl(), now).unwrap();
        let err = store.release(key, b).unwrap_err();
        assert!(matches!(err, ItemStoreError::NotHeld { .. }));

        store.release(key, a).unwrap();
        assert_eq!(store.get(key).unwrap().lifecycle, LifecycleState::Available);
    }

    #[test]
    fn expire_if_due_checks_timestamp_not_presence() {
        let key = ItemKey::new();
        let t0 = Utc::now();
        let store = seeded(&[key], t0);
        let a = ClientId::new();

        store.try_reserve(key, a, ttl(), t0).unwrap();

        // Not yet due.
        assert!(!store.expire_if_due(key, t0 + Duration::seconds(59)).unwrap());

        // Renewed in between: a sweep that observed the old deadline
        // must not reclaim.
        store.try_reserve(key, a, ttl(), t0 + Duration::seconds(59)).unwrap();
        assert!(!store.expire_if_due(key, t0 + Duration::seconds(61)).unwrap());

        // Past the renewed deadline: reclaim, then idempotent no-op.
        let late = t0 + Duration::seconds(59) + ttl();
        assert!(store.expire_if_due(key, late).unwrap());
        assert!(!store.expire_if_due(key, late).unwrap());
        assert_eq!(store.get(key).unwrap().lifecycle, LifecycleState::Available);
    }

    #[test]
    fn transition_detects_stale_state() {
        let key = ItemKey::new();
        let now = Utc::now();
        let store = seeded(&[key], now);

        let err = store
            .transition(
                key,
                LifecycleState::PendingCheckout,
                LifecycleState::Sold,
                Actor::Reconciler,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ItemStoreError::InvalidTransition {
                expected: LifecycleState::PendingCheckout,
                actual: LifecycleState::Available,
                ..
            }
        ));
    }

    #[test]
    fn transition_rejects_edges_outside_lifecycle() {
        let key = ItemKey::new();
        let now = Utc::now();
        let store = seeded(&[key], now);

        let err = store
            .transition(
                key,
                LifecycleState::Available,
                LifecycleState::Sold,
                Actor::Reconciler,
            )
            .unwrap_err();
        assert!(matches!(err, ItemStoreError::UnsupportedTransition { .. }));

        // Reserved is never a transition target.
        let err = store
            .transition(
                key,
                LifecycleState::Available,
                LifecycleState::Reserved,
                Actor::Reconciler,
            )
            .unwrap_err();
        assert!(matches!(err, ItemStoreError::UnsupportedTransition { .. }));
    }

    #[test]
    fn claim_for_selection_is_all_or_nothing() {
        let keys = [ItemKey::new(), ItemKey::new(), ItemKey::new()];
        let t0 = Utc::now();
        let store = seeded(&keys, t0);
        let client = ClientId::new();
        let selection = SelectionId::new();

        store.try_reserve(keys[0], client, ttl(), t0).unwrap();
        store.try_reserve(keys[1], client, ttl(), t0).unwrap();
        // keys[2] reserved but already expired at claim time.
        store.try_reserve(keys[2], client, Duration::seconds(1), t0).unwrap();

        let t1 = t0 + Duration::seconds(2);
        let err = store
            .claim_for_selection(&keys, client, selection, t1)
            .unwrap_err();
        match err {
            ItemStoreError::BatchRejected { failed } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].key, keys[2]);
                assert_eq!(failed[0].reason, BatchFailureReason::ReservationExpired);
            }
            other => panic!("expected BatchRejected, got {other:?}"),
        }

        // No partial effect: everything still Reserved.
        for key in keys {
            assert_eq!(store.get(key).unwrap().lifecycle, LifecycleState::Reserved);
            assert_eq!(store.get(key).unwrap().selection, None);
        }

        // Drop the dead item and retry.
        let good = [keys[0], keys[1]];
        store.claim_for_selection(&good, client, selection, t1).unwrap();
        for key in good {
            let rec = store.get(key).unwrap();
            assert_eq!(rec.lifecycle, LifecycleState::PendingCheckout);
            assert_eq!(rec.selection, Some(selection));
        }
    }

    #[test]
    fn claim_rejects_foreign_holder() {
        let key = ItemKey::new();
        let t0 = Utc::now();
        let store = seeded(&[key], t0);
        let a = ClientId::new();
        let b = ClientId::new();

        store.try_reserve(key, a, ttl(), t0).unwrap();
        let err = store
            .claim_for_selection(&[key], b, SelectionId::new(), t0)
            .unwrap_err();
        match err {
            ItemStoreError::BatchRejected { failed } => {
                assert_eq!(failed[0].reason, BatchFailureReason::NotHeld);
            }
            other => panic!("expected BatchRejected, got {other:?}"),
        }
    }

    #[test]
    fn transition_many_reports_every_offender() {
        let keys = [ItemKey::new(), ItemKey::new(), ItemKey::new()];
        let t0 = Utc::now();
        let store = seeded(&keys, t0);
        let client = ClientId::new();
        let selection = SelectionId::new();

        for &key in &keys {
            store.try_reserve(key, client, ttl(), t0).unwrap();
        }
        store.claim_for_selection(&keys, client, selection, t0).unwrap();

        // Ledger override lands on one item mid-checkout.
        store.force_unavailable(keys[1], "retired in ledger").unwrap();

        let err = store
            .transition_many(
                &keys,
                LifecycleState::PendingCheckout,
                LifecycleState::Sold,
                Actor::Reconciler,
            )
            .unwrap_err();
        match err {
            ItemStoreError::BatchRejected { failed } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].key, keys[1]);
            }
            other => panic!("expected BatchRejected, got {other:?}"),
        }

        // The two healthy items were not sold.
        assert_eq!(
            store.get(keys[0]).unwrap().lifecycle,
            LifecycleState::PendingCheckout
        );
        assert_eq!(
            store.get(keys[2]).unwrap().lifecycle,
            LifecycleState::PendingCheckout
        );
    }

    #[test]
    fn force_unavailable_wins_over_any_state_and_blocks_reserve() {
        let key = ItemKey::new();
        let t0 = Utc::now();
        let store = seeded(&[key], t0);
        let client = ClientId::new();

        store.try_reserve(key, client, ttl(), t0).unwrap();
        let overridden = store.force_unavailable(key, "not in warehouse").unwrap();
        assert_eq!(overridden, LifecycleState::Reserved);

        let err = store.try_reserve(key, client, ttl(), t0).unwrap_err();
        assert!(matches!(
            err,
            ItemStoreError::Conflict {
                state: LifecycleState::Unavailable,
                ..
            }
        ));

        // Absorbing: idempotent under repetition.
        let overridden = store.force_unavailable(key, "not in warehouse").unwrap();
        assert_eq!(overridden, LifecycleState::Unavailable);
    }

    #[test]
    fn list_available_filters_and_limits() {
        let keys = [ItemKey::new(), ItemKey::new(), ItemKey::new()];
        let t0 = Utc::now();
        let store = seeded(&keys, t0);
        let client = ClientId::new();

        store.try_reserve(keys[0], client, ttl(), t0).unwrap();

        let listed = store
            .list_available(&AvailabilityFilter::default(), t0)
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|r| r.key != keys[0]));

        let limited = store
            .list_available(
                &AvailabilityFilter {
                    limit: Some(1),
                    ..Default::default()
                },
                t0,
            )
            .unwrap();
        assert_eq!(limited.len(), 1);

        // After expiry the reserved item is purchasable again.
        let listed = store
            .list_available(&AvailabilityFilter::default(), t0 + Duration::seconds(61))
            .unwrap();
        assert_eq!(listed.len(), 3);
    }

    #[test]
    fn page_walks_the_catalog_in_key_order() {
        let mut keys = vec![ItemKey::new(), ItemKey::new(), ItemKey::new()];
        let t0 = Utc::now();
        let store = seeded(&keys, t0);
        keys.sort();

        let first = store.page(None, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].key, keys[0]);

        let rest = store.page(Some(first[1].key), 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].key, keys[2]);

        assert!(store.page(Some(keys[2]), 2).unwrap().is_empty());
    }

    #[test]
    fn concurrent_reserve_exactly_one_winner() {
        let key = ItemKey::new();
        let now = Utc::now();
        let store = Arc::new(seeded(&[key], now));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.try_reserve(key, ClientId::new(), Duration::seconds(60), now)
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(ItemStoreError::Conflict { .. })))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 15);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: under any interleaving of reserve/release/expire
        /// calls from a small set of holders, the item never carries a
        /// reservation in a non-Reserved state, a Reserved item always
        /// carries one, and a live reservation is never reassigned.
        #[test]
        fn reservation_invariants_hold(
            ops in prop::collection::vec((0u8..3, 0usize..3, 0i64..180), 1..40)
        ) {
            let key = ItemKey::new();
            let t0 = Utc::now();
            let store = seeded(&[key], t0);
            let holders = [ClientId::new(), ClientId::new(), ClientId::new()];

            for (op, who, offset) in ops {
                let now = t0 + Duration::seconds(offset);
                let before = store.get(key).unwrap();
                let live_other = before
                    .active_reservation(now)
                    .map(|r| r.holder)
                    .filter(|h| *h != holders[who]);

                match op {
                    0 => {
                        let res = store.try_reserve(key, holders[who], Duration::seconds(30), now);
                        if live_other.is_some() {
                            prop_assert!(res.is_err());
                        } else {
                            prop_assert!(res.is_ok());
                        }
                    }
                    1 => {
                        let _ = store.release(key, holders[who]);
                    }
                    _ => {
                        let _ = store.expire_if_due(key, now);
                    }
                }

                let after = store.get(key).unwrap();
                match after.lifecycle {
                    LifecycleState::Reserved => prop_assert!(after.reservation.is_some()),
                    _ => prop_assert!(after.reservation.is_none()),
                }
                // A live reservation observed before the op either
                // survived untouched or belonged to the acting holder.
                if let Some(owner) = live_other {
                    if after.lifecycle == LifecycleState::Reserved {
                        prop_assert_eq!(after.reservation.unwrap().holder, owner);
                    }
                }
            }
        }
    }
}
