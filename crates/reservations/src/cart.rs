//! Cart model and storage.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use curio_core::{ClientId, ItemKey};

/// One soft-reserved item sitting in a cart.
///
/// `expires_at` mirrors the reservation deadline in the item status
/// store. The entry is advisory; the store's timestamp is what decides
/// whether a sweep may reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub item: ItemKey,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CartEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A client's working set of reserved items before checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub client: ClientId,
    pub entries: Vec<CartEntry>,
    pub active: bool,
}

impl Cart {
    pub fn new(client: ClientId) -> Self {
        Self {
            client,
            entries: Vec::new(),
            active: true,
        }
    }

    pub fn entry(&self, item: ItemKey) -> Option<&CartEntry> {
        self.entries.iter().find(|e| e.item == item)
    }
}

/// Cart store operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartStoreError {
    #[error("cart store unavailable: {0}")]
    Storage(String),
}

/// Storage abstraction for carts.
pub trait CartStore: Send + Sync {
    /// Insert or refresh an entry, creating the cart on first use and
    /// reactivating a cleared one.
    fn upsert_entry(&self, client: ClientId, entry: CartEntry) -> Result<(), CartStoreError>;

    fn remove_entry(&self, client: ClientId, item: ItemKey) -> Result<(), CartStoreError>;

    fn cart(&self, client: ClientId) -> Result<Option<Cart>, CartStoreError>;

    /// Empty and deactivate the cart (checkout or explicit clear).
    fn clear(&self, client: ClientId) -> Result<(), CartStoreError>;

    /// Entries across all carts whose deadline has passed.
    fn expired_entries(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(ClientId, CartEntry)>, CartStoreError>;
}

/// In-memory cart store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCartStore {
    carts: RwLock<HashMap<ClientId, Cart>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<ClientId, Cart>>, CartStoreError> {
        self.carts
            .write()
            .map_err(|_| CartStoreError::Storage("lock poisoned".to_string()))
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<ClientId, Cart>>, CartStoreError> {
        self.carts
            .read()
            .map_err(|_| CartStoreError::Storage("lock poisoned".to_string()))
    }
}

impl CartStore for InMemoryCartStore {
    fn upsert_entry(&self, client: ClientId, entry: CartEntry) -> Result<(), CartStoreError> {
        let mut carts = self.write()?;
        let cart = carts.entry(client).or_insert_with(|| Cart::new(client));
        cart.active = true;
        match cart.entries.iter_mut().find(|e| e.item == entry.item) {
            Some(existing) => *existing = entry,
            None => cart.entries.push(entry),
        }
        Ok(())
    }

    fn remove_entry(&self, client: ClientId, item: ItemKey) -> Result<(), CartStoreError> {
        let mut carts = self.write()?;
        if let Some(cart) = carts.get_mut(&client) {
            cart.entries.retain(|e| e.item != item);
        }
        Ok(())
    }

    fn cart(&self, client: ClientId) -> Result<Option<Cart>, CartStoreError> {
        Ok(self.read()?.get(&client).cloned())
    }

    fn clear(&self, client: ClientId) -> Result<(), CartStoreError> {
        let mut carts = self.write()?;
        if let Some(cart) = carts.get_mut(&client) {
            cart.entries.clear();
            cart.active = false;
        }
        Ok(())
    }

    fn expired_entries(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(ClientId, CartEntry)>, CartStoreError> {
        let carts = self.read()?;
        Ok(carts
            .values()
            .flat_map(|cart| {
                cart.entries
                    .iter()
                    .filter(|e| e.is_expired(now))
                    .map(|e| (cart.client, *e))
            })
            .collect())
    }
}
