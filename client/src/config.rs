use std::env;
use std::time::Duration;

use crate::constants::{IDENTITY_ENDPOINT, IDENTITY_TIMEOUT, RECONCILE_INTERVAL};

/// Client-side settings, loaded from the environment with sensible defaults.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the session store API.
    pub store_url: String,
    /// Public IP lookup endpoint.
    pub identity_endpoint: String,
    /// Identity lookup timeout before falling back.
    pub identity_timeout: Duration,
    /// Reconciliation poll interval for the change feed task.
    pub reconcile_interval: Duration,
}

impl ClientConfig {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        let store_url = env::var("TABLESIDE_STORE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let identity_endpoint =
            env::var("TABLESIDE_IDENTITY_ENDPOINT").unwrap_or_else(|_| IDENTITY_ENDPOINT.into());

        let identity_timeout = env::var("TABLESIDE_IDENTITY_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(IDENTITY_TIMEOUT);

        let reconcile_interval = env::var("TABLESIDE_RECONCILE_INTERVAL_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(RECONCILE_INTERVAL);

        ClientConfig {
            store_url,
            identity_endpoint,
            identity_timeout,
            reconcile_interval,
        }
    }

    /// WebSocket URL of the change feed for a table scope.
    pub fn feed_url(&self, restaurant_id: &crate::types::RestaurantId, table_number: &str) -> String {
        let ws_base = if let Some(rest) = self.store_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.store_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{}", self.store_url)
        };
        format!(
            "{}/api/tables/{}/{}/feed",
            ws_base.trim_end_matches('/'),
            restaurant_id,
            table_number
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::load()
    }
}
