//! Cross-component scenarios through the engine facade.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use curio_catalog::{AvailabilityFilter, LifecycleState};
use curio_core::{Actor, AdminId, ClientId, ItemKey};
use curio_reconcile::{InMemoryLedger, LedgerClient, LedgerDisposition};
use curio_selections::SelectionStatus;

use crate::{Engine, EngineConfig};

struct World {
    engine: Engine,
    ledger: Arc<InMemoryLedger>,
    t0: DateTime<Utc>,
}

fn world(keys: &[ItemKey]) -> World {
    let config = EngineConfig {
        reservation_ttl: StdDuration::from_secs(900),
        ..EngineConfig::default()
    };
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = Engine::in_memory(config, ledger.clone() as Arc<dyn LedgerClient>);
    let t0 = Utc::now();
    for &key in keys {
        engine.register_item(key, t0).unwrap();
        ledger.set(key, LedgerDisposition::present());
    }
    World { engine, ledger, t0 }
}

#[test]
fn full_purchase_flow_from_cart_to_sold() {
    let keys = [ItemKey::new(), ItemKey::new()];
    let w = world(&keys);
    let client = ClientId::new();
    let admin = AdminId::new();

    for key in keys {
        w.engine.add_to_cart(client, key, w.t0).unwrap();
    }
    let cart = w.engine.cart(client).unwrap().unwrap();
    assert_eq!(cart.entries.len(), 2);

    let selection = w
        .engine
        .create_selection(client, keys.to_vec(), w.t0)
        .unwrap();
    assert_eq!(selection.status, SelectionStatus::Pending);

    // Claimed items leave the cart and the public listing.
    let cart = w.engine.cart(client).unwrap().unwrap();
    assert!(cart.entries.is_empty());
    assert!(
        w.engine
            .list_available(&AvailabilityFilter::default(), w.t0)
            .unwrap()
            .is_empty()
    );

    let t1 = w.t0 + Duration::minutes(1);
    w.engine.confirm_selection(selection.id, t1).unwrap();
    let finalized = w
        .engine
        .finalize_selection(selection.id, admin, t1)
        .unwrap();
    assert_eq!(finalized.status, SelectionStatus::Finalized);

    for key in keys {
        let record = w.engine.item(key).unwrap();
        assert_eq!(record.lifecycle, LifecycleState::Sold);
        assert_eq!(record.selection, Some(selection.id));
        assert!(record.reservation.is_none());
    }
}

#[test]
fn second_client_takes_over_only_after_expiry() {
    let key = ItemKey::new();
    let w = world(&[key]);
    let first = ClientId::new();
    let second = ClientId::new();

    w.engine.add_to_cart(first, key, w.t0).unwrap();

    // Inside the TTL the item is simply gone for everyone else.
    let mid = w.t0 + Duration::seconds(600);
    assert!(w.engine.add_to_cart(second, key, mid).is_err());

    // One second past the deadline it can be taken over directly.
    let late = w.t0 + Duration::seconds(901);
    let entry = w.engine.add_to_cart(second, key, late).unwrap();
    assert_eq!(entry.item, key);
    assert_eq!(
        w.engine.item(key).unwrap().active_reservation(late).map(|r| r.holder),
        Some(second)
    );
}

#[test]
fn checkout_with_one_lost_item_fails_whole_and_cart_survives() {
    let keys = [ItemKey::new(), ItemKey::new()];
    let w = world(&keys);
    let client = ClientId::new();

    w.engine.add_to_cart(client, keys[0], w.t0).unwrap();
    // keys[1] never reserved; checkout must claim nothing.
    assert!(
        w.engine
            .create_selection(client, keys.to_vec(), w.t0)
            .is_err()
    );

    let record = w.engine.item(keys[0]).unwrap();
    assert_eq!(record.lifecycle, LifecycleState::Reserved);
    // The still-valid entry is not dropped by the failed attempt.
    let cart = w.engine.cart(client).unwrap().unwrap();
    assert_eq!(cart.entries.len(), 1);
}

#[test]
fn cancel_returns_items_to_the_pool() {
    let key = ItemKey::new();
    let w = world(&[key]);
    let client = ClientId::new();

    w.engine.add_to_cart(client, key, w.t0).unwrap();
    let selection = w.engine.create_selection(client, vec![key], w.t0).unwrap();
    w.engine
        .cancel_selection(selection.id, Actor::client(client), "changed my mind", w.t0)
        .unwrap();

    let listed = w
        .engine
        .list_available(&AvailabilityFilter::default(), w.t0)
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].selection.is_none());
}

#[test]
fn reverted_sale_is_purchasable_again_with_audit_trail() {
    let key = ItemKey::new();
    let w = world(&[key]);
    let client = ClientId::new();
    let admin = AdminId::new();

    w.engine.add_to_cart(client, key, w.t0).unwrap();
    let selection = w.engine.create_selection(client, vec![key], w.t0).unwrap();
    w.engine
        .finalize_selection(selection.id, admin, w.t0)
        .unwrap();
    let reverted = w
        .engine
        .revert_sold_selection(selection.id, admin, "double-sold at the counter", w.t0)
        .unwrap();

    assert_eq!(reverted.status, SelectionStatus::Reverted);
    let last = reverted.movement_log.last().unwrap();
    assert_eq!(last.reason.as_deref(), Some("double-sold at the counter"));
    assert_eq!(w.engine.item(key).unwrap().lifecycle, LifecycleState::Available);
}

#[test]
fn ledger_retirement_overrides_a_live_reservation() {
    let key = ItemKey::new();
    let w = world(&[key]);
    let client = ClientId::new();

    w.engine.add_to_cart(client, key, w.t0).unwrap();
    w.ledger.set(key, LedgerDisposition::retired(w.t0));

    let report = w.engine.reconcile_now(w.t0).unwrap();
    assert_eq!(report.overridden, 1);
    assert_eq!(
        w.engine.item(key).unwrap().lifecycle,
        LifecycleState::Unavailable
    );

    // The client's next checkout attempt fails whole.
    assert!(w.engine.create_selection(client, vec![key], w.t0).is_err());
}

#[test]
fn finalized_sale_survives_reconciliation_but_drift_is_flagged() {
    let keys = [ItemKey::new(), ItemKey::new()];
    let w = world(&keys);
    let client = ClientId::new();
    let admin = AdminId::new();

    // keys[0]: legitimate sale with selection history.
    w.engine.add_to_cart(client, keys[0], w.t0).unwrap();
    let selection = w
        .engine
        .create_selection(client, vec![keys[0]], w.t0)
        .unwrap();
    w.engine
        .finalize_selection(selection.id, admin, w.t0)
        .unwrap();

    // keys[1]: withdrawn internally while the Ledger still carries it.
    w.engine.force_unavailable(keys[1], "damage on intake").unwrap();

    let report = w.engine.reconcile_now(w.t0).unwrap();
    assert_eq!(report.overridden, 0);
    assert_eq!(report.flagged, 1);

    let flags = w.engine.review_flags().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].key, keys[1]);
    // The sale was never unwound.
    assert_eq!(w.engine.item(keys[0]).unwrap().lifecycle, LifecycleState::Sold);
}

#[test]
fn workers_start_and_stop_cleanly() {
    let w = world(&[ItemKey::new()]);
    let workers = w.engine.start_workers();
    std::thread::sleep(StdDuration::from_millis(50));
    workers.stop();
}
