//! Models for device table sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tableside_client::session::DeviceSession;
use tableside_client::types::{RestaurantId, SessionId};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::validation::rules;

#[derive(Debug, Clone, FromRow)]
/// Database representation of a device's claim on a table.
pub struct SessionRow {
    /// Unique identifier for the session record.
    pub id: Uuid,
    /// Bearer credential for the device, `{device_ip}-{millis}-{uuid_v4}`.
    pub session_token: String,
    /// Public IP (or synthetic fallback identity) of the device.
    pub device_ip: String,
    /// Restaurant the table belongs to.
    pub restaurant_id: Uuid,
    /// Table within the restaurant.
    pub table_number: String,
    /// Whether this device holds the table's single main role.
    pub is_main_device: bool,
    /// Timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp when the session expires. Fixed at creation.
    pub expires_at: DateTime<Utc>,
    /// Timestamp of the last mutating call from this device.
    pub last_activity: DateTime<Utc>,
    /// Cart snapshot blob published by the main device.
    pub order_data: serde_json::Value,
}

impl From<SessionRow> for DeviceSession {
    fn from(row: SessionRow) -> Self {
        DeviceSession {
            id: SessionId::from_uuid(row.id),
            session_token: row.session_token,
            device_ip: row.device_ip,
            restaurant_id: RestaurantId::from_uuid(row.restaurant_id),
            table_number: row.table_number,
            is_main_device: row.is_main_device,
            created_at: row.created_at,
            expires_at: row.expires_at,
            last_activity: row.last_activity,
            order_data: row.order_data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for creating a session row. Wire-compatible with the client's
/// `NewDeviceSession`.
pub struct CreateSessionRequest {
    /// Token minted by the device, checked for shape only.
    #[validate(custom(function = "rules::validate_session_token"))]
    pub session_token: String,
    /// Device identity as reported by the device itself.
    #[validate(length(min = 1, max = 64))]
    pub device_ip: String,
    #[schema(value_type = String, format = Uuid)]
    pub restaurant_id: Uuid,
    #[validate(custom(function = "rules::validate_table_number"))]
    pub table_number: String,
    /// Whether the device claims the main role.
    pub is_main_device: bool,
    /// Requested expiry, capped at the fixed session lifetime.
    #[validate(custom(function = "rules::validate_expires_at"))]
    pub expires_at: DateTime<Utc>,
    /// Initial cart snapshot, usually empty.
    #[serde(default = "empty_order_data")]
    pub order_data: serde_json::Value,
}

fn empty_order_data() -> serde_json::Value {
    serde_json::json!({ "items": [] })
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for replacing the caller's cart snapshot.
pub struct UpdateOrderDataRequest {
    /// Full cart snapshot. Validated against the shared cart model.
    pub order_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for transferring the main role between two sessions.
pub struct TransferRequest {
    /// Token of the current main device.
    #[validate(custom(function = "rules::validate_session_token"))]
    pub old_token: String,
    /// Token of the device taking over. Must match the caller.
    #[validate(custom(function = "rules::validate_session_token"))]
    pub new_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// Outcome of a transfer request.
pub struct TransferResponse {
    /// False when the old token no longer held an unexpired main session.
    pub transferred: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
/// Outcome of an expired-session sweep.
pub struct CleanupResponse {
    /// Number of expired rows removed from the table scope.
    pub removed: u64,
}
