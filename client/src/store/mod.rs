//! Session store adapters.
//!
//! The coordinator talks to the store through [`SessionStore`]; the two
//! implementations are [`HttpSessionStore`] (the real backend) and
//! [`MemorySessionStore`] (same semantics in-process, for tests and
//! single-node embedding).

pub mod http;
pub mod memory;

pub use http::HttpSessionStore;
pub use memory::MemorySessionStore;

use async_trait::async_trait;

use crate::cart::CartSnapshot;
use crate::error::StoreError;
use crate::session::{DeviceSession, NewDeviceSession};
use crate::types::RestaurantId;

/// The shared backend every device at a table coordinates through.
///
/// Implementations enforce the single-main invariant themselves: an insert
/// or promotion that would create a second unexpired main for a scope fails
/// with [`StoreError::Conflict`], and `transfer_main` is atomic.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Unexpired sessions for the table, ordered by `created_at` ascending.
    async fn list_active(
        &self,
        restaurant_id: RestaurantId,
        table_number: &str,
    ) -> Result<Vec<DeviceSession>, StoreError>;

    /// Creates a session row. Fails with `Conflict` when `is_main_device`
    /// is set and the scope already has an unexpired main.
    async fn insert(&self, new_session: NewDeviceSession) -> Result<DeviceSession, StoreError>;

    /// Looks up the caller's own unexpired row.
    async fn find_by_token(&self, session_token: &str)
        -> Result<Option<DeviceSession>, StoreError>;

    /// Replaces the cart snapshot and stamps `last_activity`. Main only.
    async fn update_order_data(
        &self,
        session_token: &str,
        order_data: &CartSnapshot,
    ) -> Result<DeviceSession, StoreError>;

    /// Bumps `last_activity` without touching anything else.
    async fn touch(&self, session_token: &str) -> Result<(), StoreError>;

    /// Removes the caller's row. Removing an already absent row is not an
    /// error.
    async fn delete(&self, session_token: &str) -> Result<(), StoreError>;

    /// Atomically demotes the holder of `old_token` and promotes the holder
    /// of `new_token`, carrying the cart across. Returns `true` only when
    /// both rows were updated; any other outcome changes nothing.
    async fn transfer_main(&self, old_token: &str, new_token: &str) -> Result<bool, StoreError>;

    /// Promotes the caller's own row to main, provided no other unexpired
    /// main exists in the scope. Used as the takeover fallback when the
    /// previous main vanished mid-transfer.
    async fn promote(&self, session_token: &str) -> Result<DeviceSession, StoreError>;

    /// Best-effort removal of expired rows in the scope. Returns how many
    /// rows were deleted.
    async fn cleanup_expired(
        &self,
        restaurant_id: RestaurantId,
        table_number: &str,
    ) -> Result<u64, StoreError>;
}
