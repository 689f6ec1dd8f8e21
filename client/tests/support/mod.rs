//! Shared fixtures for the coordinator integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use tableside_client::cart::{CartLine, CartSnapshot};
use tableside_client::error::StoreError;
use tableside_client::identity::FixedIdentity;
use tableside_client::session::{DeviceSession, NewDeviceSession};
use tableside_client::store::memory::MemorySessionStore;
use tableside_client::store::SessionStore;
use tableside_client::token::mint_session_token;
use tableside_client::types::RestaurantId;
use tableside_client::SessionCoordinator;

/// Builds a coordinator with a fixed device identity.
pub fn coordinator_at(
    store: Arc<dyn SessionStore>,
    restaurant_id: RestaurantId,
    table_number: &str,
    device_ip: &str,
) -> SessionCoordinator {
    SessionCoordinator::new(
        store,
        Arc::new(FixedIdentity(device_ip.to_string())),
        restaurant_id,
        table_number,
    )
}

pub fn sample_cart(name: &str, quantity: u32) -> CartSnapshot {
    CartSnapshot {
        items: vec![CartLine {
            menu_item_id: Uuid::new_v4(),
            name: name.to_string(),
            quantity,
            unit_price_cents: 950,
        }],
        note: None,
        updated_at: None,
    }
}

/// Memory store wrapper that can simulate an outage or a lost election
/// race.
pub struct FlakyStore {
    pub inner: MemorySessionStore,
    down: AtomicBool,
    race_armed: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemorySessionStore::new(),
            down: AtomicBool::new(false),
            race_armed: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Arms a rival that beats the next main-device insert to the row.
    pub fn race_next_main_insert(&self) {
        self.race_armed.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn list_active(
        &self,
        restaurant_id: RestaurantId,
        table_number: &str,
    ) -> Result<Vec<DeviceSession>, StoreError> {
        self.check()?;
        self.inner.list_active(restaurant_id, table_number).await
    }

    async fn insert(&self, new_session: NewDeviceSession) -> Result<DeviceSession, StoreError> {
        self.check()?;
        if new_session.is_main_device && self.race_armed.swap(false, Ordering::SeqCst) {
            self.inner
                .insert(NewDeviceSession::starting_now(
                    mint_session_token("198.51.100.77"),
                    "198.51.100.77".to_string(),
                    new_session.restaurant_id,
                    new_session.table_number.clone(),
                    true,
                ))
                .await?;
        }
        self.inner.insert(new_session).await
    }

    async fn find_by_token(
        &self,
        session_token: &str,
    ) -> Result<Option<DeviceSession>, StoreError> {
        self.check()?;
        self.inner.find_by_token(session_token).await
    }

    async fn update_order_data(
        &self,
        session_token: &str,
        order_data: &CartSnapshot,
    ) -> Result<DeviceSession, StoreError> {
        self.check()?;
        self.inner.update_order_data(session_token, order_data).await
    }

    async fn touch(&self, session_token: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.touch(session_token).await
    }

    async fn delete(&self, session_token: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(session_token).await
    }

    async fn transfer_main(&self, old_token: &str, new_token: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.transfer_main(old_token, new_token).await
    }

    async fn promote(&self, session_token: &str) -> Result<DeviceSession, StoreError> {
        self.check()?;
        self.inner.promote(session_token).await
    }

    async fn cleanup_expired(
        &self,
        restaurant_id: RestaurantId,
        table_number: &str,
    ) -> Result<u64, StoreError> {
        self.check()?;
        self.inner.cleanup_expired(restaurant_id, table_number).await
    }
}
