//! Audit actor identity.

use serde::{Deserialize, Serialize};

use crate::id::{AdminId, ClientId};

/// Who performed a state change.
///
/// Every guarded lifecycle transition and every selection movement-log
/// entry records one of these, so an erroneous sale or a Ledger
/// override can always be traced back to its initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// A browsing client acting on its own cart.
    Client { id: ClientId },
    /// An authenticated administrator (finalize, cancel, revert).
    Admin { id: AdminId },
    /// The reconciliation service applying Ledger truth.
    Reconciler,
}

impl Actor {
    pub fn client(id: ClientId) -> Self {
        Self::Client { id }
    }

    pub fn admin(id: AdminId) -> Self {
        Self::Admin { id }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Actor::Client { id } => write!(f, "client:{id}"),
            Actor::Admin { id } => write!(f, "admin:{id}"),
            Actor::Reconciler => write!(f, "reconciler"),
        }
    }
}
