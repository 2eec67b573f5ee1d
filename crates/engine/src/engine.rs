//! Engine facade wiring the components together.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use curio_catalog::{
    AvailabilityFilter, InMemoryItemStatusStore, ItemRecord, ItemStatusStore, ItemStoreError,
};
use curio_core::{Actor, AdminId, ClientId, ItemKey, SelectionId};
use curio_reconcile::{
    InMemoryLockStore, InMemoryReviewQueue, LedgerClient, ReconcileConfig, ReconcileWorker,
    Reconciler, ReviewFlag, ReviewQueue,
};
use curio_reservations::{
    Cart, CartEntry, InMemoryCartStore, ReservationError, ReservationManager, SweeperWorker,
};
use curio_selections::{
    InMemorySelectionStore, Selection, SelectionError, SelectionService,
};

use crate::config::EngineConfig;

/// Top-level engine error, one variant per component surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Items(#[from] ItemStoreError),

    #[error(transparent)]
    Reservations(#[from] ReservationError),

    #[error(transparent)]
    Selections(#[from] SelectionError),

    #[error("review queue unavailable: {0}")]
    Review(String),
}

/// Handles for the background threads; dropping them signals stop.
pub struct Workers {
    pub sweeper: SweeperWorker,
    pub reconciler: ReconcileWorker,
}

impl Workers {
    /// Stop both workers and wait for their in-flight passes.
    pub fn stop(self) {
        self.sweeper.stop();
        self.reconciler.stop();
    }
}

/// One consistent facade over the catalog, reservation, selection and
/// reconciliation components.
///
/// All handles are `Arc`-shared, so the engine is `Clone`-free but
/// cheap to reference from multiple threads behind its own `Arc`.
pub struct Engine {
    config: EngineConfig,
    items: Arc<dyn ItemStatusStore>,
    reservations: Arc<ReservationManager>,
    selections: SelectionService,
    reconciler: Arc<Reconciler>,
    review: Arc<InMemoryReviewQueue>,
}

impl Engine {
    /// Build an engine on in-memory stores against the given Ledger.
    pub fn in_memory(config: EngineConfig, ledger: Arc<dyn LedgerClient>) -> Self {
        let items: Arc<dyn ItemStatusStore> = Arc::new(InMemoryItemStatusStore::new());
        let review = Arc::new(InMemoryReviewQueue::new());

        let reservations = Arc::new(ReservationManager::new(
            items.clone(),
            Arc::new(InMemoryCartStore::new()),
        ));
        let selections =
            SelectionService::new(items.clone(), Arc::new(InMemorySelectionStore::new()));
        let reconciler = Arc::new(Reconciler::new(
            items.clone(),
            ledger,
            Arc::new(InMemoryLockStore::new()),
            review.clone() as Arc<dyn ReviewQueue>,
            ReconcileConfig {
                batch: config.reconcile_batch,
                lock_ttl: config.reconcile_lock_ttl(),
            },
        ));

        Self {
            config,
            items,
            reservations,
            selections,
            reconciler,
            review,
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.reservation_ttl.as_secs() as i64)
    }

    // ---- catalog ----

    pub fn register_item(&self, key: ItemKey, now: DateTime<Utc>) -> Result<(), EngineError> {
        Ok(self.items.register(ItemRecord::new(key, now))?)
    }

    pub fn item(&self, key: ItemKey) -> Result<ItemRecord, EngineError> {
        Ok(self.items.get(key)?)
    }

    pub fn list_available(
        &self,
        filter: &AvailabilityFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, EngineError> {
        Ok(self.items.list_available(filter, now)?)
    }

    pub fn force_unavailable(&self, key: ItemKey, reason: &str) -> Result<(), EngineError> {
        self.items.force_unavailable(key, reason)?;
        Ok(())
    }

    // ---- reservations / cart ----

    pub fn add_to_cart(
        &self,
        client: ClientId,
        key: ItemKey,
        now: DateTime<Utc>,
    ) -> Result<CartEntry, EngineError> {
        Ok(self.reservations.add_to_cart(client, key, self.ttl(), now)?)
    }

    pub fn remove_from_cart(&self, client: ClientId, key: ItemKey) -> Result<(), EngineError> {
        Ok(self.reservations.remove_from_cart(client, key)?)
    }

    pub fn clear_cart(&self, client: ClientId) -> Result<(), EngineError> {
        Ok(self.reservations.clear_cart(client)?)
    }

    pub fn cart(&self, client: ClientId) -> Result<Option<Cart>, EngineError> {
        Ok(self.reservations.cart(client)?)
    }

    // ---- selections / checkout ----

    /// Begin checkout: claim the items and drop them from the cart.
    pub fn create_selection(
        &self,
        client: ClientId,
        items: Vec<ItemKey>,
        now: DateTime<Utc>,
    ) -> Result<Selection, EngineError> {
        let selection = self.selections.create(client, items, now)?;
        // Claimed items no longer belong in the cart; item state is
        // already PendingCheckout so this touches cart entries only.
        self.reservations.drop_entries(client, &selection.items)?;
        Ok(selection)
    }

    pub fn confirm_selection(
        &self,
        id: SelectionId,
        now: DateTime<Utc>,
    ) -> Result<Selection, EngineError> {
        Ok(self.selections.confirm(id, now)?)
    }

    pub fn finalize_selection(
        &self,
        id: SelectionId,
        admin: AdminId,
        now: DateTime<Utc>,
    ) -> Result<Selection, EngineError> {
        Ok(self.selections.finalize(id, admin, now)?)
    }

    pub fn cancel_selection(
        &self,
        id: SelectionId,
        actor: Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Selection, EngineError> {
        Ok(self.selections.cancel(id, actor, reason, now)?)
    }

    pub fn revert_sold_selection(
        &self,
        id: SelectionId,
        admin: AdminId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Selection, EngineError> {
        Ok(self.selections.revert_sold(id, admin, reason, now)?)
    }

    pub fn selection(&self, id: SelectionId) -> Result<Selection, EngineError> {
        Ok(self.selections.get(id)?)
    }

    pub fn list_selections(&self) -> Result<Vec<Selection>, EngineError> {
        Ok(self.selections.list()?)
    }

    // ---- reconciliation ----

    /// Run one reconciliation cycle inline (also driven periodically by
    /// the worker).
    pub fn reconcile_now(
        &self,
        now: DateTime<Utc>,
    ) -> Result<curio_reconcile::CycleReport, curio_reconcile::ReconcileError> {
        self.reconciler.run_cycle(now)
    }

    pub fn review_flags(&self) -> Result<Vec<ReviewFlag>, EngineError> {
        self.review
            .pending()
            .map_err(|e| EngineError::Review(e.to_string()))
    }

    /// Spawn the sweep and reconciliation threads.
    pub fn start_workers(&self) -> Workers {
        Workers {
            sweeper: SweeperWorker::spawn(self.reservations.clone(), self.config.sweep_interval),
            reconciler: ReconcileWorker::spawn(
                self.reconciler.clone(),
                self.config.reconcile_interval,
            ),
        }
    }
}
