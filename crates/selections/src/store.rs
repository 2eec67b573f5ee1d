//! Selection storage.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use curio_core::SelectionId;

use crate::selection::Selection;

/// Selection store operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionStoreError {
    #[error("selection {id} not found")]
    NotFound { id: SelectionId },

    #[error("selection {id} already exists")]
    AlreadyExists { id: SelectionId },

    #[error("selection store unavailable: {0}")]
    Storage(String),
}

/// Storage abstraction for selections.
///
/// Selections are never deleted; finalized/cancelled/reverted records
/// stay as history.
pub trait SelectionStore: Send + Sync {
    fn insert(&self, selection: Selection) -> Result<(), SelectionStoreError>;

    fn get(&self, id: SelectionId) -> Result<Selection, SelectionStoreError>;

    fn update(&self, selection: &Selection) -> Result<(), SelectionStoreError>;

    /// All selections, for the admin surface.
    fn list(&self) -> Result<Vec<Selection>, SelectionStoreError>;
}

/// In-memory selection store. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySelectionStore {
    selections: RwLock<HashMap<SelectionId, Selection>>,
}

impl InMemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<SelectionId, Selection>>, SelectionStoreError>
    {
        self.selections
            .write()
            .map_err(|_| SelectionStoreError::Storage("lock poisoned".to_string()))
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<SelectionId, Selection>>, SelectionStoreError>
    {
        self.selections
            .read()
            .map_err(|_| SelectionStoreError::Storage("lock poisoned".to_string()))
    }
}

impl SelectionStore for InMemorySelectionStore {
    fn insert(&self, selection: Selection) -> Result<(), SelectionStoreError> {
        let mut selections = self.write()?;
        if selections.contains_key(&selection.id) {
            return Err(SelectionStoreError::AlreadyExists { id: selection.id });
        }
        selections.insert(selection.id, selection);
        Ok(())
    }

    fn get(&self, id: SelectionId) -> Result<Selection, SelectionStoreError> {
        self.read()?
            .get(&id)
            .cloned()
            .ok_or(SelectionStoreError::NotFound { id })
    }

    fn update(&self, selection: &Selection) -> Result<(), SelectionStoreError> {
        let mut selections = self.write()?;
        if !selections.contains_key(&selection.id) {
            return Err(SelectionStoreError::NotFound { id: selection.id });
        }
        selections.insert(selection.id, selection.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Selection>, SelectionStoreError> {
        Ok(self.read()?.values().cloned().collect())
    }
}
