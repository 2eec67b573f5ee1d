//! Item record and lifecycle state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use curio_core::{ClientId, ItemKey, SelectionId};

/// Lifecycle state of a unique physical item.
///
/// Normal flow is `Available → Reserved → PendingCheckout → Sold`, with
/// side exits back to `Available` (expiry/release, cancel, admin
/// revert). `Unavailable` is an absorbing Ledger-driven override: once
/// the Ledger says the item no longer exists, no internal state wins it
/// back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Available,
    Reserved,
    PendingCheckout,
    Sold,
    Unavailable,
}

impl LifecycleState {
    /// Whether a guarded transition from `self` to `to` is part of the
    /// lifecycle. `Unavailable` is reachable only through
    /// `force_unavailable`, which bypasses this table.
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Available, Reserved)
                | (Reserved, Available)
                | (Reserved, PendingCheckout)
                | (PendingCheckout, Sold)
                | (PendingCheckout, Available)
                | (Sold, Available)
        )
    }

    pub fn is_absorbing(self) -> bool {
        matches!(self, LifecycleState::Unavailable)
    }
}

impl core::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            LifecycleState::Available => "available",
            LifecycleState::Reserved => "reserved",
            LifecycleState::PendingCheckout => "pending_checkout",
            LifecycleState::Sold => "sold",
            LifecycleState::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Last known Ledger-side disposition, cached on the item record by the
/// reconciliation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    /// The Ledger knows the item and it is still in the warehouse.
    Present,
    /// The Ledger recorded the item as removed/retired.
    Retired,
    /// The Ledger has no record of the item.
    Absent,
}

/// A time-bounded soft claim on an item.
///
/// There is no implicit renewal: a holder must re-reserve (e.g. on each
/// cart view) or the sweep reclaims the item once `expires_at` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub holder: ClientId,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(holder: ClientId, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            holder,
            reserved_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// An active reservation is one that has not yet expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }
}

/// Durable record of one unique physical item.
///
/// Invariants: at most one active, non-expired reservation at any time;
/// `Sold` implies no active reservation. `selection` links the item to
/// the checkout batch that claimed it and survives into `Sold` so
/// reconciliation can tell a legitimate sale from unexplained drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub key: ItemKey,
    pub lifecycle: LifecycleState,
    pub reservation: Option<Reservation>,
    pub selection: Option<SelectionId>,
    pub ledger_state: Option<LedgerState>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl ItemRecord {
    /// A freshly registered item, available for reservation.
    pub fn new(key: ItemKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            lifecycle: LifecycleState::Available,
            reservation: None,
            selection: None,
            ledger_state: None,
            last_reconciled_at: None,
            registered_at: now,
        }
    }

    /// The reservation, if one exists and has not expired.
    pub fn active_reservation(&self, now: DateTime<Utc>) -> Option<&Reservation> {
        self.reservation.as_ref().filter(|r| r.is_active(now))
    }

    /// Whether the item can be shown as purchasable: `Available`, or
    /// `Reserved` with an expired (reclaimable) reservation.
    pub fn is_purchasable(&self, now: DateTime<Utc>) -> bool {
        match self.lifecycle {
            LifecycleState::Available => true,
            LifecycleState::Reserved => self.active_reservation(now).is_none(),
            _ => false,
        }
    }
}
