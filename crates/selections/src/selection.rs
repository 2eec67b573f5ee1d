//! Selection record and status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use curio_core::{Actor, ClientId, ItemKey, SelectionId};

/// Selection status lifecycle.
///
/// `Pending → Confirmed → Finalized`; `Pending → Cancelled`;
/// `Finalized → Reverted`. A finalized selection is a historical
/// record, mutated only by the audited admin revert and never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    Pending,
    Confirmed,
    Finalized,
    Cancelled,
    Reverted,
}

impl SelectionStatus {
    pub fn is_cancellable(self) -> bool {
        matches!(self, SelectionStatus::Pending | SelectionStatus::Confirmed)
    }

    pub fn is_finalizable(self) -> bool {
        matches!(self, SelectionStatus::Pending | SelectionStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SelectionStatus::Cancelled | SelectionStatus::Reverted
        )
    }
}

impl core::fmt::Display for SelectionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SelectionStatus::Pending => "pending",
            SelectionStatus::Confirmed => "confirmed",
            SelectionStatus::Finalized => "finalized",
            SelectionStatus::Cancelled => "cancelled",
            SelectionStatus::Reverted => "reverted",
        };
        f.write_str(s)
    }
}

/// Kind of movement recorded in a selection's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementEvent {
    Created,
    Confirmed,
    Finalized,
    Cancelled,
    Reverted,
}

/// One audited movement: who moved the selection, when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub event: MovementEvent,
    pub actor: Actor,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// A client's checkout batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub id: SelectionId,
    pub client: ClientId,
    pub items: Vec<ItemKey>,
    pub status: SelectionStatus,
    pub created_at: DateTime<Utc>,
    pub movement_log: Vec<MovementEntry>,
}

impl Selection {
    pub fn new(
        id: SelectionId,
        client: ClientId,
        items: Vec<ItemKey>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            client,
            items,
            status: SelectionStatus::Pending,
            created_at: now,
            movement_log: vec![MovementEntry {
                event: MovementEvent::Created,
                actor: Actor::client(client),
                reason: None,
                at: now,
            }],
        }
    }

    /// Append a movement-log entry.
    pub fn record(
        &mut self,
        event: MovementEvent,
        actor: Actor,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.movement_log.push(MovementEntry {
            event,
            actor,
            reason,
            at,
        });
    }
}
