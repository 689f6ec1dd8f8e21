//! Session change events carried over the store's WebSocket feed.

use serde::{Deserialize, Serialize};

use crate::session::DeviceSession;
use crate::types::RestaurantId;

/// A change to a table's session set, broadcast by the store.
///
/// `Transferred` carries the promoted row so consumers can adopt the new
/// main without an extra round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Created {
        session: DeviceSession,
    },
    Updated {
        session: DeviceSession,
    },
    Transferred {
        old_token: String,
        session: DeviceSession,
    },
    Deleted {
        restaurant_id: RestaurantId,
        table_number: String,
        session_token: String,
    },
}

impl SessionEvent {
    /// The table scope this event belongs to.
    pub fn scope(&self) -> (&RestaurantId, &str) {
        match self {
            SessionEvent::Created { session }
            | SessionEvent::Updated { session }
            | SessionEvent::Transferred { session, .. } => {
                (&session.restaurant_id, session.table_number.as_str())
            }
            SessionEvent::Deleted {
                restaurant_id,
                table_number,
                ..
            } => (restaurant_id, table_number.as_str()),
        }
    }

    pub fn matches_scope(&self, restaurant_id: &RestaurantId, table_number: &str) -> bool {
        let (event_restaurant, event_table) = self.scope();
        event_restaurant == restaurant_id && event_table == table_number
    }
}
