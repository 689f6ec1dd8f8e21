use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness plus a database ping. The endpoint stays 200 through a database
/// outage so orchestrators do not kill a process that could still serve the
/// feed; the ping result is reported in the body instead.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "ok",
        Err(err) => {
            tracing::warn!(error = %err, "health check database ping failed");
            "unavailable"
        }
    };
    Json(json!({ "status": "ok", "database": database }))
}
