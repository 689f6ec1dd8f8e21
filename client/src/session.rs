//! The device session wire model shared with the session store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::constants::SESSION_DURATION_SECS;
use crate::types::{RestaurantId, SessionId};

/// A device's claim on a table, as stored by the backend.
///
/// At most one unexpired session per `(restaurant_id, table_number)` carries
/// `is_main_device = true`. `expires_at` is fixed at creation; activity bumps
/// `last_activity` but never extends the lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceSession {
    /// Store-assigned row id.
    #[schema(value_type = String, format = Uuid)]
    pub id: SessionId,
    /// Bearer credential for this device, `{device_ip}-{millis}-{uuid_v4}`.
    pub session_token: String,
    /// Public IP (or synthetic fallback identity) of the device.
    pub device_ip: String,
    #[schema(value_type = String, format = Uuid)]
    pub restaurant_id: RestaurantId,
    pub table_number: String,
    pub is_main_device: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Cart snapshot blob; decode with [`crate::cart::CartSnapshot::from_value`].
    #[schema(value_type = Object)]
    pub order_data: serde_json::Value,
}

impl DeviceSession {
    /// Whole seconds until expiry, clamped at zero.
    pub fn time_left_secs(&self) -> i64 {
        time_left_secs_at(self.expires_at, Utc::now())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Seconds remaining between `now` and `expires_at`, never negative.
pub fn time_left_secs_at(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = expires_at.signed_duration_since(now).num_milliseconds();
    (millis / 1000).max(0)
}

/// Payload for creating a session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeviceSession {
    pub session_token: String,
    pub device_ip: String,
    pub restaurant_id: RestaurantId,
    pub table_number: String,
    pub is_main_device: bool,
    pub expires_at: DateTime<Utc>,
    pub order_data: serde_json::Value,
}

impl NewDeviceSession {
    /// A session claim starting now with the standard two hour lifetime and
    /// an empty cart.
    pub fn starting_now(
        session_token: String,
        device_ip: String,
        restaurant_id: RestaurantId,
        table_number: String,
        is_main_device: bool,
    ) -> Self {
        Self {
            session_token,
            device_ip,
            restaurant_id,
            table_number,
            is_main_device,
            expires_at: Utc::now() + Duration::seconds(SESSION_DURATION_SECS),
            order_data: crate::cart::CartSnapshot::empty().to_value(),
        }
    }
}
