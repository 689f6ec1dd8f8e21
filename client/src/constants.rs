//! Protocol-wide constants shared by the coordinator and the stores.

use std::time::Duration;

/// Hard lifetime of a table session. The expiry is fixed at creation and is
/// never extended by activity.
pub const SESSION_DURATION_SECS: i64 = 2 * 60 * 60;

/// How often the coordinator re-lists the table scope to reconcile its view
/// with the store when the change feed is quiet or down.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Public IP lookup endpoint used for device identity.
pub const IDENTITY_ENDPOINT: &str = "https://api.ipify.org?format=json";

/// Upper bound on the identity lookup before falling back to a synthetic
/// device identity.
pub const IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix of synthetic device identities minted when the IP lookup fails.
pub const FALLBACK_IDENTITY_PREFIX: &str = "fallback";

/// Delay before the feed task retries a dropped WebSocket connection.
pub const FEED_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Maximum number of line items accepted in a cart snapshot.
pub const MAX_CART_LINES: u64 = 100;

/// Maximum length of a cart line item name.
pub const MAX_CART_NAME_LEN: u64 = 200;

/// Maximum length of the free-form cart note.
pub const MAX_CART_NOTE_LEN: u64 = 500;
