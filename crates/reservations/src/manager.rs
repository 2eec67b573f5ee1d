//! Reservation manager: cart operations over the item status store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use curio_catalog::{ItemStatusStore, ItemStoreError};
use curio_core::{ClientId, ItemKey};

use crate::cart::{Cart, CartEntry, CartStore, CartStoreError};

/// Reservation-level error returned synchronously to callers.
///
/// `Unavailable` is an expected, frequent outcome with contended unique
/// inventory and must not be rendered as a system failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// The item is already held by someone else or has left the pool.
    #[error("item {key} is no longer available")]
    Unavailable { key: ItemKey },

    /// The client does not hold this reservation; stale client state.
    #[error("reservation on item {key} is not held by this client")]
    NotHeld { key: ItemKey },

    #[error("item {key} not found")]
    NotFound { key: ItemKey },

    #[error(transparent)]
    Items(ItemStoreError),

    #[error(transparent)]
    Carts(#[from] CartStoreError),
}

impl From<ItemStoreError> for ReservationError {
    fn from(err: ItemStoreError) -> Self {
        match err {
            ItemStoreError::Conflict { key, .. } => ReservationError::Unavailable { key },
            ItemStoreError::NotHeld { key } => ReservationError::NotHeld { key },
            ItemStoreError::NotFound { key } => ReservationError::NotFound { key },
            other => ReservationError::Items(other),
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Cart entries whose deadline had passed.
    pub scanned: usize,
    /// Reservations this pass actually returned to the pool.
    pub reclaimed: usize,
}

/// Cart-facing reservation service.
///
/// Every acquisition goes through `ItemStatusStore::try_reserve`; a
/// `Conflict` surfaces immediately as `Unavailable`; the manager never
/// queues or retries on the client's behalf.
pub struct ReservationManager {
    items: Arc<dyn ItemStatusStore>,
    carts: Arc<dyn CartStore>,
}

impl ReservationManager {
    pub fn new(items: Arc<dyn ItemStatusStore>, carts: Arc<dyn CartStore>) -> Self {
        Self { items, carts }
    }

    /// Reserve the item and record it in the client's cart.
    ///
    /// Re-adding an item the client already holds renews the TTL; there
    /// is no implicit renewal otherwise.
    pub fn add_to_cart(
        &self,
        client: ClientId,
        key: ItemKey,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<CartEntry, ReservationError> {
        let reservation = self.items.try_reserve(key, client, ttl, now)?;
        let entry = CartEntry {
            item: key,
            reserved_at: reservation.reserved_at,
            expires_at: reservation.expires_at,
        };
        self.carts.upsert_entry(client, entry)?;
        debug!(client = %client, key = %key, expires_at = %entry.expires_at, "item added to cart");
        Ok(entry)
    }

    /// Release the reservation and drop the cart entry.
    ///
    /// The entry is dropped even when the store reports `NotHeld` (the
    /// reservation already expired or moved on) so the cart does not
    /// keep showing an item the client no longer holds; the error still
    /// propagates so the caller can tell the client to refresh.
    pub fn remove_from_cart(
        &self,
        client: ClientId,
        key: ItemKey,
    ) -> Result<(), ReservationError> {
        let released = self.items.release(key, client);
        self.carts.remove_entry(client, key)?;
        released?;
        Ok(())
    }

    /// Explicitly clear the cart, releasing whatever the client still
    /// holds.
    pub fn clear_cart(&self, client: ClientId) -> Result<(), ReservationError> {
        if let Some(cart) = self.carts.cart(client)? {
            for entry in &cart.entries {
                match self.items.release(entry.item, client) {
                    Ok(()) | Err(ItemStoreError::NotHeld { .. }) => {}
                    Err(other) => return Err(other.into()),
                }
            }
        }
        self.carts.clear(client)?;
        Ok(())
    }

    pub fn cart(&self, client: ClientId) -> Result<Option<Cart>, ReservationError> {
        Ok(self.carts.cart(client)?)
    }

    /// Drop cart entries without touching item state.
    ///
    /// Used after a successful checkout claim, when the items have
    /// already moved to `PendingCheckout` and no longer belong in a
    /// cart.
    pub fn drop_entries(
        &self,
        client: ClientId,
        keys: &[ItemKey],
    ) -> Result<(), ReservationError> {
        for &key in keys {
            self.carts.remove_entry(client, key)?;
        }
        Ok(())
    }

    /// Reclaim overdue reservations and prune their cart entries.
    ///
    /// The sole mechanism returning abandoned reservations to the pool.
    /// Safe against racing renewals: `expire_if_due` compares the
    /// store's own deadline, so an entry that looks overdue here but
    /// was renewed in between reclaims nothing (the stale cart entry is
    /// pruned either way; the renewal re-inserted a fresh one).
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, ReservationError> {
        let due = self.carts.expired_entries(now)?;
        let mut report = SweepReport {
            scanned: due.len(),
            reclaimed: 0,
        };

        for (client, entry) in due {
            match self.items.expire_if_due(entry.item, now) {
                Ok(true) => report.reclaimed += 1,
                Ok(false) => {}
                // An unregistered item cannot be reclaimed, but its
                // entry should still not linger in a cart.
                Err(ItemStoreError::NotFound { key }) => {
                    warn!(key = %key, "cart entry references unknown item");
                }
                Err(other) => return Err(other.into()),
            }

            // Only prune if the entry was not refreshed concurrently.
            if let Some(cart) = self.carts.cart(client)? {
                if let Some(current) = cart.entry(entry.item) {
                    if current.is_expired(now) {
                        self.carts.remove_entry(client, entry.item)?;
                    }
                }
            }
        }

        Ok(report)
    }
}
