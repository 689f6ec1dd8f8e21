//! End-to-end coordinator scenarios against the in-process store.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use support::{coordinator_at, sample_cart, FlakyStore};
use tableside_client::cache::SessionCache;
use tableside_client::error::{CoordinatorError, StoreError};
use tableside_client::events::SessionEvent;
use tableside_client::store::memory::MemorySessionStore;
use tableside_client::types::RestaurantId;
use tableside_client::{DeviceRole, SessionPhase};

#[tokio::test]
async fn first_device_becomes_main_later_devices_become_guests() {
    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();
    let a = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1");
    let b = coordinator_at(store.clone(), restaurant, "7", "203.0.113.2");

    assert_eq!(a.initialize().await.expect("a init"), DeviceRole::Main);
    assert_eq!(b.initialize().await.expect("b init"), DeviceRole::Guest);

    let a_token = a.state().session.expect("a row").session_token;
    let b_main = b.state().main_session.expect("b sees a main");
    assert_eq!(b_main.session_token, a_token);

    // Initialization is idempotent.
    assert_eq!(a.initialize().await.expect("a again"), DeviceRole::Main);
    assert_eq!(store.all_rows().len(), 2);
}

#[tokio::test]
async fn election_claims_nothing_while_the_store_is_down() {
    let store = Arc::new(FlakyStore::new());
    let coordinator = coordinator_at(store.clone(), RestaurantId::new(), "7", "203.0.113.1");

    store.set_down(true);
    let err = coordinator.initialize().await.expect_err("no election");
    assert!(matches!(
        err,
        CoordinatorError::Store(StoreError::Unavailable(_))
    ));
    assert_eq!(coordinator.state().phase, SessionPhase::Uninitialized);
    assert!(store.inner.all_rows().is_empty());

    // The same coordinator can elect once the store is back.
    store.set_down(false);
    assert_eq!(
        coordinator.initialize().await.expect("retry"),
        DeviceRole::Main
    );
}

#[tokio::test]
async fn losing_the_election_race_lands_as_guest() {
    let store = Arc::new(FlakyStore::new());
    let coordinator = coordinator_at(store.clone(), RestaurantId::new(), "7", "203.0.113.1");

    store.race_next_main_insert();
    assert_eq!(
        coordinator.initialize().await.expect("init"),
        DeviceRole::Guest
    );

    let state = coordinator.state();
    let main = state.main_session.expect("rival is known");
    assert!(main.session_token.starts_with("198.51.100.77-"));
    assert_eq!(store.inner.all_rows().len(), 2);
}

#[tokio::test]
async fn concurrent_initializes_elect_exactly_one_main() {
    use tableside_client::store::SessionStore;

    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let coordinator = Arc::new(coordinator_at(
                store.clone(),
                restaurant,
                "7",
                &format!("203.0.113.{i}"),
            ));
            tokio::spawn(async move { coordinator.initialize().await.expect("initialize") })
        })
        .collect();

    let mut mains = 0;
    for handle in handles {
        if handle.await.expect("join") == DeviceRole::Main {
            mains += 1;
        }
    }
    assert_eq!(mains, 1, "exactly one device wins the election");

    let active = store.list_active(restaurant, "7").await.expect("list");
    assert_eq!(active.len(), 8);
    assert_eq!(active.iter().filter(|row| row.is_main_device).count(), 1);
}

#[tokio::test]
async fn concurrent_takeovers_promote_exactly_one_guest() {
    use tableside_client::store::SessionStore;

    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();
    let main = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1");
    assert_eq!(main.initialize().await.expect("main init"), DeviceRole::Main);

    let mut guests = Vec::new();
    for i in 0..4 {
        let guest = Arc::new(coordinator_at(
            store.clone(),
            restaurant,
            "7",
            &format!("198.51.100.{i}"),
        ));
        assert_eq!(guest.initialize().await.expect("guest init"), DeviceRole::Guest);
        guests.push(guest);
    }

    let handles: Vec<_> = guests
        .iter()
        .cloned()
        .map(|guest| tokio::spawn(async move { guest.takeover().await }))
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(()) => winners += 1,
            Err(CoordinatorError::MainHeldElsewhere) => {}
            Err(other) => panic!("unexpected takeover failure: {other}"),
        }
    }
    assert_eq!(winners, 1, "exactly one takeover succeeds");

    let active = store.list_active(restaurant, "7").await.expect("list");
    assert_eq!(active.iter().filter(|row| row.is_main_device).count(), 1);
    let losers = guests
        .iter()
        .filter(|guest| guest.state().phase == SessionPhase::Guest)
        .count();
    assert_eq!(losers, 3);
}

#[tokio::test]
async fn takeover_swaps_roles_and_carries_the_cart() {
    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();
    let a = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1");
    let b = coordinator_at(store.clone(), restaurant, "7", "203.0.113.2");
    a.initialize().await.expect("a init");
    b.initialize().await.expect("b init");

    a.update_order_data(&sample_cart("Ramen", 2))
        .await
        .expect("main writes cart");

    b.takeover().await.expect("takeover");
    assert_eq!(b.state().phase, SessionPhase::Main);
    let carried = b.state().cart();
    assert_eq!(carried.items.len(), 1);
    assert_eq!(carried.items[0].name, "Ramen");

    // The old main finds out on its next reconcile.
    a.reconcile().await;
    assert_eq!(a.state().phase, SessionPhase::Guest);
    assert_eq!(
        a.state().main_session.expect("new main known").session_token,
        b.state().session.expect("b row").session_token
    );
    let err = a
        .update_order_data(&sample_cart("Gyoza", 1))
        .await
        .expect_err("demoted device may not write");
    assert!(matches!(err, CoordinatorError::NotMain));
}

#[tokio::test]
async fn takeover_promotes_own_row_when_the_main_vanished() {
    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();
    let a = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1");
    let b = coordinator_at(store.clone(), restaurant, "7", "203.0.113.2");
    a.initialize().await.expect("a init");
    b.initialize().await.expect("b init");

    // The main's row disappears behind everyone's back.
    let a_token = a.state().session.expect("a row").session_token;
    use tableside_client::store::SessionStore;
    store.delete(&a_token).await.expect("drop main row");

    b.takeover().await.expect("fallback promotion");
    assert_eq!(b.state().phase, SessionPhase::Main);
    assert!(b.state().session.expect("b row").is_main_device);
}

#[tokio::test]
async fn takeover_loses_cleanly_to_a_rival() {
    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();
    let a = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1");
    let b = coordinator_at(store.clone(), restaurant, "7", "203.0.113.2");
    let c = coordinator_at(store.clone(), restaurant, "7", "203.0.113.3");
    a.initialize().await.expect("a init");
    b.initialize().await.expect("b init");
    c.initialize().await.expect("c init");

    c.takeover().await.expect("c wins the role first");

    let err = b.takeover().await.expect_err("b arrives too late");
    assert!(matches!(err, CoordinatorError::MainHeldElsewhere));
    assert_eq!(b.state().phase, SessionPhase::Guest);
    assert_eq!(
        b.state().main_session.expect("rival known").session_token,
        c.state().session.expect("c row").session_token
    );
}

#[tokio::test]
async fn cart_updates_reach_guests_and_stale_events_lose() {
    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();
    let a = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1");
    let b = coordinator_at(store.clone(), restaurant, "7", "203.0.113.2");
    a.initialize().await.expect("a init");
    b.initialize().await.expect("b init");

    let stale_main = b.state().main_session.expect("pre-update view");
    let updated = a
        .update_order_data(&sample_cart("Gyoza", 1))
        .await
        .expect("main writes");

    b.apply_event(&SessionEvent::Updated {
        session: updated.clone(),
    })
    .await;
    assert_eq!(b.state().cart().items[0].name, "Gyoza");

    // An out-of-order older event must not roll the cart back.
    b.apply_event(&SessionEvent::Updated {
        session: stale_main,
    })
    .await;
    assert_eq!(b.state().cart().items[0].name, "Gyoza");

    let err = b
        .update_order_data(&sample_cart("Tea", 1))
        .await
        .expect_err("guests may not write");
    assert!(matches!(err, CoordinatorError::NotMain));
}

#[tokio::test]
async fn feed_events_update_the_local_view() {
    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();
    let a = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1");
    let b = coordinator_at(store.clone(), restaurant, "7", "203.0.113.2");
    a.initialize().await.expect("a init");
    b.initialize().await.expect("b init");

    let a_token = a.state().session.expect("a row").session_token;
    b.takeover().await.expect("takeover");
    let b_row = b.state().session.expect("b row");

    // The demotion reaches the old main as a transfer event.
    a.apply_event(&SessionEvent::Transferred {
        old_token: a_token.clone(),
        session: b_row.clone(),
    })
    .await;
    assert_eq!(a.state().phase, SessionPhase::Guest);
    assert_eq!(
        a.state().main_session.expect("adopted").session_token,
        b_row.session_token
    );

    // Deleting the own row ends the session.
    a.apply_event(&SessionEvent::Deleted {
        restaurant_id: restaurant,
        table_number: "7".to_string(),
        session_token: a_token,
    })
    .await;
    assert_eq!(a.state().phase, SessionPhase::Ended);
}

#[tokio::test]
async fn session_expiry_is_hard_and_time_left_clamps_at_zero() {
    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();
    let coordinator = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1");
    coordinator.initialize().await.expect("init");
    let token = coordinator.state().session.expect("row").session_token;

    // Pull the expiry in close, then let the coordinator pick it up.
    store.set_expires_at(&token, Utc::now() + chrono::Duration::milliseconds(150));
    coordinator.reconcile().await;
    assert_eq!(coordinator.state().phase, SessionPhase::Main);
    // Less than a whole second left already floors to zero.
    assert_eq!(coordinator.time_left_secs(), 0);

    tokio::time::sleep(Duration::from_millis(250)).await;
    coordinator.check_expiry().await;
    assert_eq!(coordinator.state().phase, SessionPhase::Ended);
    assert_eq!(coordinator.time_left_secs(), 0);

    // An ended coordinator refuses further work.
    let err = coordinator.initialize().await.expect_err("no restart");
    assert!(matches!(err, CoordinatorError::Ended));
}

#[tokio::test]
async fn end_session_is_local_even_when_the_store_fails() {
    let store = Arc::new(FlakyStore::new());
    let coordinator = coordinator_at(store.clone(), RestaurantId::new(), "7", "203.0.113.1");
    coordinator.initialize().await.expect("init");

    store.set_down(true);
    coordinator.end_session().await;
    assert_eq!(coordinator.state().phase, SessionPhase::Ended);
    // The row could not be deleted; it stays until expiry or cleanup.
    assert_eq!(store.inner.all_rows().len(), 1);
}

#[tokio::test]
async fn resume_readopts_the_cached_claim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache_path = dir.path().join("claim.json");
    let store = Arc::new(MemorySessionStore::new());
    let restaurant = RestaurantId::new();

    let first = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1")
        .with_cache(SessionCache::new(&cache_path));
    first.initialize().await.expect("init");
    let token = first.state().session.expect("row").session_token;
    drop(first);

    // A fresh process re-adopts the same row instead of re-electing.
    let second = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1")
        .with_cache(SessionCache::new(&cache_path));
    let resumed = second.resume().await.expect("resume");
    assert_eq!(resumed, Some(DeviceRole::Main));
    assert_eq!(
        second.state().session.expect("adopted row").session_token,
        token
    );
    assert_eq!(store.all_rows().len(), 1);

    // Ending clears the cached claim.
    second.end_session().await;
    let third = coordinator_at(store.clone(), restaurant, "7", "203.0.113.1")
        .with_cache(SessionCache::new(&cache_path));
    assert_eq!(third.resume().await.expect("nothing left"), None);
}
