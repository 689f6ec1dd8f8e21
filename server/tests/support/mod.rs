#![allow(dead_code)]
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};
use tableside_client::token::mint_session_token;
use tableside_server::{config::Config, state::AppState};
use uuid::Uuid;

pub fn test_config() -> Config {
    Config {
        database_url: env::var("TEST_DATABASE_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "postgres://localhost/tableside_test".to_string()),
        port: 0,
        ip_rate_limit_per_second: 1000,
        ip_rate_limit_burst: 1000,
        // High enough that tests sharing the process-wide creation store
        // never trip it by accident.
        create_limit_max: 1000,
        create_limit_window_secs: 300,
        feed_capacity: 64,
    }
}

pub fn test_state(pool: PgPool) -> AppState {
    AppState::new(pool, test_config())
}

/// A pool that points nowhere and fails fast, for tests that never reach the
/// database (or must observe it failing).
pub fn lazy_pool() -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(100))
        .connect_lazy("postgres://localhost:1/unreachable")
        .expect("lazy pool")
}

/// Connects to the configured test database. Returns `None` (with a notice)
/// when no database is configured so the caller can skip.
pub async fn test_pool() -> Option<PgPool> {
    let database_url = match env::var("TEST_DATABASE_URL").or_else(|_| env::var("DATABASE_URL")) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("--- TEST_DATABASE_URL not set; skipping database-backed test ---");
            return None;
        }
    };

    let mut retry_count = 0;
    let max_retries = 3;

    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&database_url)
            .await
        {
            Ok(pool) => return Some(pool),
            Err(e) if retry_count < max_retries => {
                retry_count += 1;
                eprintln!(
                    "Retrying DB connection (attempt {}/{}): {}",
                    retry_count, max_retries, e
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => panic!(
                "Failed to connect to test database after {} retries: {}",
                max_retries, e
            ),
        }
    }
}

/// A device identity unique to this call, shaped like the client's synthetic
/// fallback identity.
pub fn unique_device_ip() -> String {
    format!("fallback-{}", Uuid::new_v4())
}

/// Inserts a live session row directly and returns its token.
pub async fn seed_session(
    pool: &PgPool,
    restaurant_id: Uuid,
    table_number: &str,
    is_main_device: bool,
) -> String {
    let device_ip = unique_device_ip();
    let token = mint_session_token(&device_ip);
    sqlx::query(
        "INSERT INTO device_sessions \
            (session_token, device_ip, restaurant_id, table_number, is_main_device, expires_at) \
         VALUES ($1, $2, $3, $4, $5, NOW() + INTERVAL '2 hours')",
    )
    .bind(&token)
    .bind(&device_ip)
    .bind(restaurant_id)
    .bind(table_number)
    .bind(is_main_device)
    .execute(pool)
    .await
    .expect("insert session");
    token
}

/// Inserts an already expired session row. `created_at` is backdated as well
/// so the expiry check constraint holds.
pub async fn seed_expired_session(
    pool: &PgPool,
    restaurant_id: Uuid,
    table_number: &str,
    is_main_device: bool,
) -> String {
    let device_ip = unique_device_ip();
    let token = mint_session_token(&device_ip);
    sqlx::query(
        "INSERT INTO device_sessions \
            (session_token, device_ip, restaurant_id, table_number, is_main_device, \
             created_at, expires_at, last_activity) \
         VALUES ($1, $2, $3, $4, $5, \
             NOW() - INTERVAL '3 hours', NOW() - INTERVAL '1 hour', NOW() - INTERVAL '1 hour')",
    )
    .bind(&token)
    .bind(&device_ip)
    .bind(restaurant_id)
    .bind(table_number)
    .bind(is_main_device)
    .execute(pool)
    .await
    .expect("insert expired session");
    token
}

/// Rows currently stored for a table scope, expired ones included.
pub async fn count_sessions(pool: &PgPool, restaurant_id: Uuid, table_number: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM device_sessions WHERE restaurant_id = $1 AND table_number = $2",
    )
    .bind(restaurant_id)
    .bind(table_number)
    .fetch_one(pool)
    .await
    .expect("count sessions")
}

pub async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json body")
}
