//! Typed cart snapshots relayed through the session store.
//!
//! The relay model is full-snapshot, last-writer-wins: the main device
//! publishes the whole cart and guests replace their copy. Snapshots are
//! validated on the way in and on the way out, so a malformed blob coming
//! back from the store is discarded instead of replacing a good cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// Bounds here mirror crate::constants::{MAX_CART_LINES, MAX_CART_NAME_LEN,
// MAX_CART_NOTE_LEN}; validator attributes need literal values.

/// One line item in the shared cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartLine {
    /// Menu item this line refers to.
    pub menu_item_id: Uuid,
    /// Display name captured at add time.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Number of units ordered.
    #[validate(range(min = 1))]
    pub quantity: u32,
    /// Unit price in cents, non-negative.
    #[validate(range(min = 0))]
    pub unit_price_cents: i64,
}

/// The full cart state for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartSnapshot {
    #[validate(length(max = 100), nested)]
    pub items: Vec<CartLine>,
    /// Free-form note for the kitchen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub note: Option<String>,
    /// When the main device last published this snapshot.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartSnapshot {
    /// An empty cart, the initial `order_data` of every new session.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            note: None,
            updated_at: None,
        }
    }

    /// Decodes and validates a snapshot from a stored JSON value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        let snapshot: CartSnapshot =
            serde_json::from_value(value.clone()).map_err(|err| err.to_string())?;
        snapshot.validate().map_err(|err| err.to_string())?;
        Ok(snapshot)
    }

    /// Serializes the snapshot for the `order_data` column.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "items": [] }))
    }

    /// Total units across all lines.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Total price in cents across all lines.
    pub fn total_cents(&self) -> i64 {
        self.items
            .iter()
            .map(|line| line.unit_price_cents.saturating_mul(i64::from(line.quantity)))
            .sum()
    }
}

impl Default for CartSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
