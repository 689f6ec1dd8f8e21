#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use axum::Json;
use tableside_client::cart::{CartLine, CartSnapshot};
use tableside_client::session::DeviceSession;
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::models::session::{
    CleanupResponse, CreateSessionRequest, TransferRequest, TransferResponse,
    UpdateOrderDataRequest,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_doc,
        list_sessions_doc,
        create_session_doc,
        current_session_doc,
        update_order_data_doc,
        touch_session_doc,
        delete_session_doc,
        transfer_session_doc,
        promote_session_doc,
        cleanup_table_doc,
        session_feed_doc
    ),
    components(
        schemas(
            DeviceSession,
            CartSnapshot,
            CartLine,
            CreateSessionRequest,
            UpdateOrderDataRequest,
            TransferRequest,
            TransferResponse,
            CleanupResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Tables", description = "Table-scoped session listing and maintenance"),
        (name = "Sessions", description = "Device session lifecycle and cart relay"),
        (name = "Feed", description = "Session change feed")
    ),
    security(("SessionToken" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        components.add_security_scheme(
            "SessionToken",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-session-token"))),
        );
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = serde_json::Value)),
    tag = "Tables",
    security(())
)]
fn health_doc() {}

#[utoipa::path(
    get,
    path = "/api/tables/{restaurant_id}/{table_number}/sessions",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant the table belongs to"),
        ("table_number" = String, Path, description = "Table within the restaurant")
    ),
    responses((status = 200, description = "Unexpired sessions, oldest first", body = [DeviceSession])),
    tag = "Tables",
    security(())
)]
fn list_sessions_doc() {}

#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session registered", body = DeviceSession),
        (status = 409, description = "Table already has a main device"),
        (status = 429, description = "Creation budget exhausted for this device")
    ),
    tag = "Sessions",
    security(())
)]
fn create_session_doc() {}

#[utoipa::path(
    get,
    path = "/api/sessions/me",
    responses(
        (status = 200, description = "The caller's session row", body = DeviceSession),
        (status = 401, description = "Unknown or expired session token")
    ),
    tag = "Sessions"
)]
fn current_session_doc() {}

#[utoipa::path(
    patch,
    path = "/api/sessions/order-data",
    request_body = UpdateOrderDataRequest,
    responses(
        (status = 200, description = "Cart snapshot replaced", body = DeviceSession),
        (status = 403, description = "Caller is not the main device")
    ),
    tag = "Sessions"
)]
fn update_order_data_doc() {}

#[utoipa::path(
    post,
    path = "/api/sessions/touch",
    responses((status = 200, description = "Activity timestamp bumped", body = serde_json::Value)),
    tag = "Sessions"
)]
fn touch_session_doc() {}

#[utoipa::path(
    delete,
    path = "/api/sessions",
    responses((status = 200, description = "Session ended", body = serde_json::Value)),
    tag = "Sessions"
)]
fn delete_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/sessions/transfer",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer outcome", body = TransferResponse),
        (status = 403, description = "Caller is not the incoming device")
    ),
    tag = "Sessions"
)]
fn transfer_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/sessions/promote",
    responses(
        (status = 200, description = "Caller now holds the main role", body = DeviceSession),
        (status = 409, description = "Another device already holds the main role")
    ),
    tag = "Sessions"
)]
fn promote_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/tables/{restaurant_id}/{table_number}/cleanup",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant the table belongs to"),
        ("table_number" = String, Path, description = "Table within the restaurant")
    ),
    responses((status = 200, description = "Expired rows removed", body = CleanupResponse)),
    tag = "Tables",
    security(())
)]
fn cleanup_table_doc() {}

#[utoipa::path(
    get,
    path = "/api/tables/{restaurant_id}/{table_number}/feed",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant the table belongs to"),
        ("table_number" = String, Path, description = "Table within the restaurant")
    ),
    responses((status = 101, description = "WebSocket stream of session change events")),
    tag = "Feed",
    security(())
)]
fn session_feed_doc() {}
