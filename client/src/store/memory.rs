//! In-process session store with the same semantics as the HTTP backend.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::cart::CartSnapshot;
use crate::error::StoreError;
use crate::session::{DeviceSession, NewDeviceSession};
use crate::store::SessionStore;
use crate::types::{RestaurantId, SessionId};

/// Session store backed by a mutex-guarded vector.
///
/// Every operation takes the lock for its whole duration, so writes are
/// atomic exactly like the SQL transactions on the real backend.
#[derive(Default)]
pub struct MemorySessionStore {
    rows: Mutex<Vec<DeviceSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row, expired ones included. Test helper.
    pub fn all_rows(&self) -> Vec<DeviceSession> {
        self.lock_rows().clone()
    }

    /// Rewrites a row's expiry in place. Test helper.
    pub fn set_expires_at(&self, session_token: &str, expires_at: chrono::DateTime<Utc>) {
        let mut rows = self.lock_rows();
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.session_token == session_token)
        {
            row.expires_at = expires_at;
        }
    }

    fn lock_rows(&self) -> std::sync::MutexGuard<'_, Vec<DeviceSession>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn has_other_live_main(
        rows: &[DeviceSession],
        restaurant_id: &RestaurantId,
        table_number: &str,
        excluding_token: Option<&str>,
    ) -> bool {
        let now = Utc::now();
        rows.iter().any(|row| {
            row.restaurant_id == *restaurant_id
                && row.table_number == table_number
                && row.is_main_device
                && !row.is_expired_at(now)
                && excluding_token != Some(row.session_token.as_str())
        })
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn list_active(
        &self,
        restaurant_id: RestaurantId,
        table_number: &str,
    ) -> Result<Vec<DeviceSession>, StoreError> {
        let now = Utc::now();
        let rows = self.lock_rows();
        let mut active: Vec<DeviceSession> = rows
            .iter()
            .filter(|row| {
                row.restaurant_id == restaurant_id
                    && row.table_number == table_number
                    && !row.is_expired_at(now)
            })
            .cloned()
            .collect();
        active.sort_by_key(|row| row.created_at);
        Ok(active)
    }

    async fn insert(&self, new_session: NewDeviceSession) -> Result<DeviceSession, StoreError> {
        let now = Utc::now();
        let mut rows = self.lock_rows();

        // Expired rows never block a new claim.
        rows.retain(|row| {
            !(row.restaurant_id == new_session.restaurant_id
                && row.table_number == new_session.table_number
                && row.is_expired_at(now))
        });

        if rows
            .iter()
            .any(|row| row.session_token == new_session.session_token)
        {
            return Err(StoreError::Conflict("session token already exists".into()));
        }
        if new_session.is_main_device
            && Self::has_other_live_main(
                &rows,
                &new_session.restaurant_id,
                &new_session.table_number,
                None,
            )
        {
            return Err(StoreError::Conflict(
                "table already has a main device".into(),
            ));
        }

        let session = DeviceSession {
            id: SessionId::from_uuid(Uuid::new_v4()),
            session_token: new_session.session_token,
            device_ip: new_session.device_ip,
            restaurant_id: new_session.restaurant_id,
            table_number: new_session.table_number,
            is_main_device: new_session.is_main_device,
            created_at: now,
            expires_at: new_session.expires_at,
            last_activity: now,
            order_data: new_session.order_data,
        };
        rows.push(session.clone());
        Ok(session)
    }

    async fn find_by_token(
        &self,
        session_token: &str,
    ) -> Result<Option<DeviceSession>, StoreError> {
        let now = Utc::now();
        let rows = self.lock_rows();
        Ok(rows
            .iter()
            .find(|row| row.session_token == session_token && !row.is_expired_at(now))
            .cloned())
    }

    async fn update_order_data(
        &self,
        session_token: &str,
        order_data: &CartSnapshot,
    ) -> Result<DeviceSession, StoreError> {
        let now = Utc::now();
        let mut rows = self.lock_rows();
        let row = rows
            .iter_mut()
            .find(|row| row.session_token == session_token && !row.is_expired_at(now))
            .ok_or_else(|| StoreError::NotFound("unknown or expired session token".into()))?;
        if !row.is_main_device {
            return Err(StoreError::Unauthorized(
                "only the main device may update order data".into(),
            ));
        }
        row.order_data = order_data.to_value();
        row.last_activity = now;
        Ok(row.clone())
    }

    async fn touch(&self, session_token: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut rows = self.lock_rows();
        let row = rows
            .iter_mut()
            .find(|row| row.session_token == session_token && !row.is_expired_at(now))
            .ok_or_else(|| StoreError::NotFound("unknown or expired session token".into()))?;
        row.last_activity = now;
        Ok(())
    }

    async fn delete(&self, session_token: &str) -> Result<(), StoreError> {
        let mut rows = self.lock_rows();
        rows.retain(|row| row.session_token != session_token);
        Ok(())
    }

    async fn transfer_main(&self, old_token: &str, new_token: &str) -> Result<bool, StoreError> {
        if old_token == new_token {
            return Ok(false);
        }
        let now = Utc::now();
        let mut rows = self.lock_rows();

        let old_idx = rows.iter().position(|row| {
            row.session_token == old_token && row.is_main_device && !row.is_expired_at(now)
        });
        let new_idx = rows
            .iter()
            .position(|row| row.session_token == new_token && !row.is_expired_at(now));

        let (Some(old_idx), Some(new_idx)) = (old_idx, new_idx) else {
            return Ok(false);
        };
        if rows[old_idx].restaurant_id != rows[new_idx].restaurant_id
            || rows[old_idx].table_number != rows[new_idx].table_number
        {
            return Ok(false);
        }

        let carried = rows[old_idx].order_data.clone();
        rows[old_idx].is_main_device = false;
        rows[old_idx].last_activity = now;
        rows[new_idx].is_main_device = true;
        rows[new_idx].order_data = carried;
        rows[new_idx].last_activity = now;
        Ok(true)
    }

    async fn promote(&self, session_token: &str) -> Result<DeviceSession, StoreError> {
        let now = Utc::now();
        let mut rows = self.lock_rows();

        let idx = rows
            .iter()
            .position(|row| row.session_token == session_token && !row.is_expired_at(now))
            .ok_or_else(|| StoreError::NotFound("unknown or expired session token".into()))?;
        let scope = (rows[idx].restaurant_id, rows[idx].table_number.clone());
        if Self::has_other_live_main(&rows, &scope.0, &scope.1, Some(session_token)) {
            return Err(StoreError::Conflict(
                "another device is already the main device".into(),
            ));
        }

        rows[idx].is_main_device = true;
        rows[idx].last_activity = now;
        Ok(rows[idx].clone())
    }

    async fn cleanup_expired(
        &self,
        restaurant_id: RestaurantId,
        table_number: &str,
    ) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut rows = self.lock_rows();
        let before = rows.len();
        rows.retain(|row| {
            !(row.restaurant_id == restaurant_id
                && row.table_number == table_number
                && row.is_expired_at(now))
        });
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claim(
        restaurant_id: RestaurantId,
        table: &str,
        token: &str,
        is_main: bool,
    ) -> NewDeviceSession {
        NewDeviceSession::starting_now(
            token.to_string(),
            "203.0.113.7".to_string(),
            restaurant_id,
            table.to_string(),
            is_main,
        )
    }

    #[tokio::test]
    async fn second_main_insert_conflicts() {
        let store = MemorySessionStore::new();
        let restaurant = RestaurantId::new();
        store
            .insert(claim(restaurant, "1", "a-1-00000000-0000-4000-8000-000000000001", true))
            .await
            .expect("first main");

        let err = store
            .insert(claim(restaurant, "1", "b-2-00000000-0000-4000-8000-000000000002", true))
            .await
            .expect_err("second main must conflict");
        assert!(matches!(err, StoreError::Conflict(_)));

        // A different table is a different scope.
        store
            .insert(claim(restaurant, "2", "c-3-00000000-0000-4000-8000-000000000003", true))
            .await
            .expect("other table main");
    }

    #[tokio::test]
    async fn expired_main_does_not_block_new_claim() {
        let store = MemorySessionStore::new();
        let restaurant = RestaurantId::new();
        let mut stale = claim(restaurant, "1", "a-1-00000000-0000-4000-8000-000000000001", true);
        stale.expires_at = Utc::now() - Duration::seconds(1);
        store.insert(stale).await.expect("stale row");

        store
            .insert(claim(restaurant, "1", "b-2-00000000-0000-4000-8000-000000000002", true))
            .await
            .expect("new main over expired one");
    }

    #[tokio::test]
    async fn list_active_filters_and_orders() {
        let store = MemorySessionStore::new();
        let restaurant = RestaurantId::new();
        let first = store
            .insert(claim(restaurant, "1", "a-1-00000000-0000-4000-8000-000000000001", true))
            .await
            .expect("main");
        let second = store
            .insert(claim(restaurant, "1", "b-2-00000000-0000-4000-8000-000000000002", false))
            .await
            .expect("guest");
        let mut expired = claim(restaurant, "1", "c-3-00000000-0000-4000-8000-000000000003", false);
        expired.expires_at = Utc::now() - Duration::seconds(10);
        store.insert(expired).await.expect("expired row");

        let active = store.list_active(restaurant, "1").await.expect("list");
        let tokens: Vec<_> = active.iter().map(|s| s.session_token.as_str()).collect();
        assert_eq!(
            tokens,
            vec![first.session_token.as_str(), second.session_token.as_str()]
        );
    }

    #[tokio::test]
    async fn transfer_swaps_roles_and_carries_cart() {
        let store = MemorySessionStore::new();
        let restaurant = RestaurantId::new();
        let main = store
            .insert(claim(restaurant, "1", "a-1-00000000-0000-4000-8000-000000000001", true))
            .await
            .expect("main");
        let guest = store
            .insert(claim(restaurant, "1", "b-2-00000000-0000-4000-8000-000000000002", false))
            .await
            .expect("guest");

        let cart = CartSnapshot {
            items: vec![crate::cart::CartLine {
                menu_item_id: Uuid::new_v4(),
                name: "Ramen".into(),
                quantity: 2,
                unit_price_cents: 1200,
            }],
            note: None,
            updated_at: Some(Utc::now()),
        };
        store
            .update_order_data(&main.session_token, &cart)
            .await
            .expect("main writes cart");

        let transferred = store
            .transfer_main(&main.session_token, &guest.session_token)
            .await
            .expect("transfer");
        assert!(transferred);

        let rows = store.list_active(restaurant, "1").await.expect("list");
        let old = rows
            .iter()
            .find(|r| r.session_token == main.session_token)
            .expect("old row still present");
        let new = rows
            .iter()
            .find(|r| r.session_token == guest.session_token)
            .expect("new row");
        assert!(!old.is_main_device);
        assert!(new.is_main_device);
        assert_eq!(new.order_data, cart.to_value());
    }

    #[tokio::test]
    async fn transfer_with_dead_old_token_changes_nothing() {
        let store = MemorySessionStore::new();
        let restaurant = RestaurantId::new();
        let guest = store
            .insert(claim(restaurant, "1", "b-2-00000000-0000-4000-8000-000000000002", false))
            .await
            .expect("guest");

        let transferred = store
            .transfer_main("gone-1-00000000-0000-4000-8000-00000000000f", &guest.session_token)
            .await
            .expect("transfer call");
        assert!(!transferred);

        let rows = store.list_active(restaurant, "1").await.expect("list");
        assert!(!rows[0].is_main_device);
    }

    #[tokio::test]
    async fn promote_refuses_when_live_main_exists() {
        let store = MemorySessionStore::new();
        let restaurant = RestaurantId::new();
        store
            .insert(claim(restaurant, "1", "a-1-00000000-0000-4000-8000-000000000001", true))
            .await
            .expect("main");
        let guest = store
            .insert(claim(restaurant, "1", "b-2-00000000-0000-4000-8000-000000000002", false))
            .await
            .expect("guest");

        let err = store
            .promote(&guest.session_token)
            .await
            .expect_err("promotion must conflict");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn guest_cannot_update_order_data() {
        let store = MemorySessionStore::new();
        let restaurant = RestaurantId::new();
        let guest = store
            .insert(claim(restaurant, "1", "b-2-00000000-0000-4000-8000-000000000002", false))
            .await
            .expect("guest");

        let err = store
            .update_order_data(&guest.session_token, &CartSnapshot::empty())
            .await
            .expect_err("guest write must be rejected");
        assert!(matches!(err, StoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_rows_in_scope() {
        let store = MemorySessionStore::new();
        let restaurant = RestaurantId::new();
        store
            .insert(claim(restaurant, "1", "b-2-00000000-0000-4000-8000-000000000002", true))
            .await
            .expect("live");
        let mut expired = claim(restaurant, "1", "a-1-00000000-0000-4000-8000-000000000001", false);
        expired.expires_at = Utc::now() - Duration::seconds(1);
        store.insert(expired).await.expect("expired");
        let mut other_scope = claim(restaurant, "2", "c-3-00000000-0000-4000-8000-000000000003", false);
        other_scope.expires_at = Utc::now() - Duration::seconds(1);
        store.insert(other_scope).await.expect("other scope expired");

        let removed = store.cleanup_expired(restaurant, "1").await.expect("cleanup");
        assert_eq!(removed, 1);
        assert_eq!(store.all_rows().len(), 2);
    }
}
