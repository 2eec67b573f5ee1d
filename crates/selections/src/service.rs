//! Selection state machine service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use curio_catalog::{BatchFailure, ItemStatusStore, ItemStoreError, LifecycleState};
use curio_core::{Actor, AdminId, ClientId, DomainError, ItemKey, SelectionId};

use crate::selection::{MovementEvent, Selection, SelectionStatus};
use crate::store::{SelectionStore, SelectionStoreError};

/// Selection-level error returned synchronously to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// A multi-item movement aborted with zero state change; lists
    /// exactly which items failed so the caller can drop them and
    /// retry.
    #[error("selection movement aborted, {} item(s) failed", failed.len())]
    PartialFailure { failed: Vec<BatchFailure> },

    #[error("selection {id} not found")]
    NotFound { id: SelectionId },

    /// The selection's status no longer permits this operation.
    #[error("selection {id} is {actual}, operation requires {required}")]
    InvalidStatus {
        id: SelectionId,
        required: &'static str,
        actual: SelectionStatus,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Items(ItemStoreError),

    #[error("selection store unavailable: {0}")]
    Storage(String),
}

impl From<ItemStoreError> for SelectionError {
    fn from(err: ItemStoreError) -> Self {
        match err {
            ItemStoreError::BatchRejected { failed } => SelectionError::PartialFailure { failed },
            other => SelectionError::Items(other),
        }
    }
}

impl From<SelectionStoreError> for SelectionError {
    fn from(err: SelectionStoreError) -> Self {
        match err {
            SelectionStoreError::NotFound { id } => SelectionError::NotFound { id },
            SelectionStoreError::AlreadyExists { id } => {
                SelectionError::Storage(format!("selection {id} already exists"))
            }
            SelectionStoreError::Storage(msg) => SelectionError::Storage(msg),
        }
    }
}

/// Drives checkout batches through their lifecycle.
///
/// Item movements go through the item status store's batch operations,
/// which precheck every item under one write guard; a failure leaves
/// the system in its pre-state, never a mix.
pub struct SelectionService {
    items: Arc<dyn ItemStatusStore>,
    selections: Arc<dyn SelectionStore>,
}

impl SelectionService {
    pub fn new(items: Arc<dyn ItemStatusStore>, selections: Arc<dyn SelectionStore>) -> Self {
        Self { items, selections }
    }

    /// Create a selection from items the client currently holds.
    ///
    /// Verifies every reservation; if any item fails, nothing moves and
    /// the error reports the offenders so the client can drop them and
    /// retry. On success all items move `Reserved → PendingCheckout`
    /// atomically and the selection is persisted as `Pending`.
    pub fn create(
        &self,
        client: ClientId,
        items: Vec<ItemKey>,
        now: DateTime<Utc>,
    ) -> Result<Selection, SelectionError> {
        if items.is_empty() {
            return Err(DomainError::validation("selection requires at least one item").into());
        }
        let mut seen = std::collections::HashSet::new();
        let keys: Vec<ItemKey> = items.into_iter().filter(|k| seen.insert(*k)).collect();

        let id = SelectionId::new();
        self.items.claim_for_selection(&keys, client, id, now)?;

        let selection = Selection::new(id, client, keys, now);
        self.selections.insert(selection.clone())?;
        info!(selection = %id, client = %client, items = selection.items.len(), "selection created");
        Ok(selection)
    }

    /// Acknowledge the checkout: `Pending → Confirmed`. Items are
    /// untouched.
    pub fn confirm(
        &self,
        id: SelectionId,
        now: DateTime<Utc>,
    ) -> Result<Selection, SelectionError> {
        let mut selection = self.selections.get(id)?;
        if selection.status != SelectionStatus::Pending {
            return Err(SelectionError::InvalidStatus {
                id,
                required: "pending",
                actual: selection.status,
            });
        }

        selection.status = SelectionStatus::Confirmed;
        let actor = Actor::client(selection.client);
        selection.record(MovementEvent::Confirmed, actor, None, now);
        self.selections.update(&selection)?;
        Ok(selection)
    }

    /// Complete the sale: all items `PendingCheckout → Sold`, selection
    /// `→ Finalized`.
    ///
    /// Fails whole, leaving every item and the selection unchanged,
    /// if any item is no longer `PendingCheckout`; that means the world
    /// changed under the checkout (e.g. a Ledger override) and must be
    /// surfaced, never skipped.
    pub fn finalize(
        &self,
        id: SelectionId,
        admin: AdminId,
        now: DateTime<Utc>,
    ) -> Result<Selection, SelectionError> {
        let mut selection = self.selections.get(id)?;
        if !selection.status.is_finalizable() {
            return Err(SelectionError::InvalidStatus {
                id,
                required: "pending or confirmed",
                actual: selection.status,
            });
        }

        let actor = Actor::admin(admin);
        self.items.transition_many(
            &selection.items,
            LifecycleState::PendingCheckout,
            LifecycleState::Sold,
            actor,
        )?;

        selection.status = SelectionStatus::Finalized;
        selection.record(MovementEvent::Finalized, actor, None, now);
        self.selections.update(&selection)?;
        info!(selection = %id, admin = %admin, items = selection.items.len(), "selection finalized");
        Ok(selection)
    }

    /// Abandon the checkout: items return to the pool, selection
    /// `→ Cancelled`. Allowed only from `Pending`/`Confirmed`.
    pub fn cancel(
        &self,
        id: SelectionId,
        actor: Actor,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Selection, SelectionError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation("cancel requires a reason").into());
        }

        let mut selection = self.selections.get(id)?;
        if !selection.status.is_cancellable() {
            return Err(SelectionError::InvalidStatus {
                id,
                required: "pending or confirmed",
                actual: selection.status,
            });
        }

        self.items.transition_many(
            &selection.items,
            LifecycleState::PendingCheckout,
            LifecycleState::Available,
            actor,
        )?;

        selection.status = SelectionStatus::Cancelled;
        selection.record(MovementEvent::Cancelled, actor, Some(reason), now);
        self.selections.update(&selection)?;
        info!(selection = %id, %actor, "selection cancelled");
        Ok(selection)
    }

    /// Audited admin correction of an erroneous sale: items
    /// `Sold → Available`, selection `→ Reverted`. Allowed only from
    /// `Finalized`; the reason is mandatory and persisted in the
    /// movement log.
    pub fn revert_sold(
        &self,
        id: SelectionId,
        admin: AdminId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Selection, SelectionError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(DomainError::validation("revert requires a reason").into());
        }

        let mut selection = self.selections.get(id)?;
        if selection.status != SelectionStatus::Finalized {
            return Err(SelectionError::InvalidStatus {
                id,
                required: "finalized",
                actual: selection.status,
            });
        }

        let actor = Actor::admin(admin);
        self.items.transition_many(
            &selection.items,
            LifecycleState::Sold,
            LifecycleState::Available,
            actor,
        )?;

        selection.status = SelectionStatus::Reverted;
        selection.record(MovementEvent::Reverted, actor, Some(reason), now);
        self.selections.update(&selection)?;
        info!(selection = %id, admin = %admin, "finalized selection reverted");
        Ok(selection)
    }

    pub fn get(&self, id: SelectionId) -> Result<Selection, SelectionError> {
        Ok(self.selections.get(id)?)
    }

    pub fn list(&self) -> Result<Vec<Selection>, SelectionError> {
        Ok(self.selections.list()?)
    }
}
