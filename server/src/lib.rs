//! Session store backend for QR table ordering.
//!
//! Devices at a restaurant table register claims here, elect a single main
//! device per table, relay cart snapshots, and follow each other's changes
//! over a WebSocket feed. The wire types are shared with `tableside-client`.

use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod state;
pub mod validation;

use state::AppState;

/// Builds the API router with all routes and shared layers. The per-IP rate
/// limiting layer is added by the binary, where peer addresses are available.
pub fn app(state: AppState) -> Router {
    // Routes callable without a session token.
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route("/api/docs/openapi.json", get(docs::openapi_json))
        .route(
            "/api/tables/{restaurant_id}/{table_number}/sessions",
            get(handlers::sessions::list_sessions),
        )
        .route(
            "/api/tables/{restaurant_id}/{table_number}/cleanup",
            post(handlers::sessions::cleanup_table),
        )
        .route(
            "/api/tables/{restaurant_id}/{table_number}/feed",
            get(handlers::feed::session_feed),
        )
        .route("/api/sessions", post(handlers::sessions::create_session));

    // Routes that resolve the caller's session row first.
    let session_routes = Router::new()
        .route("/api/sessions/me", get(handlers::sessions::current_session))
        .route(
            "/api/sessions/order-data",
            patch(handlers::sessions::update_order_data),
        )
        .route(
            "/api/sessions/touch",
            post(handlers::sessions::touch_session),
        )
        .route("/api/sessions", delete(handlers::sessions::delete_session))
        .route(
            "/api/sessions/transfer",
            post(handlers::sessions::transfer_session),
        )
        .route(
            "/api/sessions/promote",
            post(handlers::sessions::promote_session),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::session_token::require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .layer(axum_middleware::from_fn(middleware::request_id::request_id))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PATCH,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers(Any)
                        .max_age(std::time::Duration::from_secs(24 * 60 * 60)),
                ),
        )
        .with_state(state)
}
