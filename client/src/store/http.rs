//! HTTP implementation of [`SessionStore`] against the tableside backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use crate::cart::CartSnapshot;
use crate::error::StoreError;
use crate::session::{DeviceSession, NewDeviceSession};
use crate::store::SessionStore;
use crate::types::RestaurantId;

/// Header carrying the caller's session token on authenticated calls.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body shape produced by the backend.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[allow(dead_code)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferResponseBody {
    transferred: bool,
}

#[derive(Debug, Deserialize)]
struct CleanupResponseBody {
    removed: u64,
}

/// Talks to the session store API at `base_url`.
pub struct HttpSessionStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSessionStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        if response.status().is_success() {
            response
                .json::<T>()
                .await
                .map_err(|err| StoreError::Malformed(err.to_string()))
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: Response) -> StoreError {
        let status = response.status();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("http status {}", status.as_u16()),
        };
        map_status(status, message)
    }
}

/// Maps backend status codes onto the store failure taxonomy.
fn map_status(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::CONFLICT => StoreError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            StoreError::Malformed(message)
        }
        _ => StoreError::Unavailable(message),
    }
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    async fn list_active(
        &self,
        restaurant_id: RestaurantId,
        table_number: &str,
    ) -> Result<Vec<DeviceSession>, StoreError> {
        let url = self.url(&format!(
            "/api/tables/{}/{}/sessions",
            restaurant_id, table_number
        ));
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Self::decode(response).await
    }

    async fn insert(&self, new_session: NewDeviceSession) -> Result<DeviceSession, StoreError> {
        let response = self
            .http
            .post(self.url("/api/sessions"))
            .json(&new_session)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Self::decode(response).await
    }

    async fn find_by_token(
        &self,
        session_token: &str,
    ) -> Result<Option<DeviceSession>, StoreError> {
        let response = self
            .http
            .get(self.url("/api/sessions/me"))
            .header(SESSION_TOKEN_HEADER, session_token)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        // An unknown or expired token is "no row", not a failure.
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND
        ) {
            return Ok(None);
        }
        Self::decode(response).await.map(Some)
    }

    async fn update_order_data(
        &self,
        session_token: &str,
        order_data: &CartSnapshot,
    ) -> Result<DeviceSession, StoreError> {
        let response = self
            .http
            .patch(self.url("/api/sessions/order-data"))
            .header(SESSION_TOKEN_HEADER, session_token)
            .json(&serde_json::json!({ "order_data": order_data }))
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Self::decode(response).await
    }

    async fn touch(&self, session_token: &str) -> Result<(), StoreError> {
        let response = self
            .http
            .post(self.url("/api/sessions/touch"))
            .header(SESSION_TOKEN_HEADER, session_token)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn delete(&self, session_token: &str) -> Result<(), StoreError> {
        let response = self
            .http
            .delete(self.url("/api/sessions"))
            .header(SESSION_TOKEN_HEADER, session_token)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        // Deleting an already absent row counts as done.
        if response.status().is_success()
            || matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND
            )
        {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn transfer_main(&self, old_token: &str, new_token: &str) -> Result<bool, StoreError> {
        let response = self
            .http
            .post(self.url("/api/sessions/transfer"))
            .header(SESSION_TOKEN_HEADER, new_token)
            .json(&serde_json::json!({
                "old_token": old_token,
                "new_token": new_token,
            }))
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let body: TransferResponseBody = Self::decode(response).await?;
        Ok(body.transferred)
    }

    async fn promote(&self, session_token: &str) -> Result<DeviceSession, StoreError> {
        let response = self
            .http
            .post(self.url("/api/sessions/promote"))
            .header(SESSION_TOKEN_HEADER, session_token)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Self::decode(response).await
    }

    async fn cleanup_expired(
        &self,
        restaurant_id: RestaurantId,
        table_number: &str,
    ) -> Result<u64, StoreError> {
        let url = self.url(&format!(
            "/api/tables/{}/{}/cleanup",
            restaurant_id, table_number
        ));
        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        let body: CleanupResponseBody = Self::decode(response).await?;
        Ok(body.removed)
    }
}
