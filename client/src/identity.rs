//! Device identity resolution.
//!
//! A device is identified by its public IP, looked up once per coordinator.
//! The lookup must never block session setup: any failure (network, timeout,
//! parse) degrades to a synthetic `fallback-{millis}-{random}` identity.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::constants::{FALLBACK_IDENTITY_PREFIX, IDENTITY_ENDPOINT, IDENTITY_TIMEOUT};

#[derive(Debug, Deserialize)]
struct IpifyResponse {
    ip: String,
}

/// Resolves the identity this device presents to the session store.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves the device identity. Infallible: implementations fall back
    /// to a synthetic identity rather than erroring.
    async fn resolve(&self) -> String;
}

/// Looks up the device's public IP over HTTPS.
pub struct PublicIpProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl PublicIpProvider {
    pub fn new() -> Self {
        Self::with_endpoint(IDENTITY_ENDPOINT, IDENTITY_TIMEOUT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn lookup(&self) -> Result<String, reqwest::Error> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?;
        let body: IpifyResponse = response.json().await?;
        Ok(body.ip)
    }
}

impl Default for PublicIpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for PublicIpProvider {
    async fn resolve(&self) -> String {
        match self.lookup().await {
            Ok(ip) if !ip.is_empty() => ip,
            Ok(_) => {
                tracing::warn!("ip lookup returned an empty address, using fallback identity");
                fallback_identity()
            }
            Err(err) => {
                tracing::warn!(error = %err, "ip lookup failed, using fallback identity");
                fallback_identity()
            }
        }
    }
}

/// Fixed identity, for tests and embedded deployments behind a known address.
pub struct FixedIdentity(pub String);

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn resolve(&self) -> String {
        self.0.clone()
    }
}

/// Synthetic identity minted when the public IP cannot be determined.
pub fn fallback_identity() -> String {
    format!(
        "{}-{}-{}",
        FALLBACK_IDENTITY_PREFIX,
        Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}
