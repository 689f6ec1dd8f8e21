use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::time::Duration;
use tableside_client::cart::CartSnapshot;
use tableside_client::events::SessionEvent;
use tableside_client::session::DeviceSession;
use tableside_client::types::RestaurantId;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    middleware::rate_limit::check_session_create_limit,
    middleware::session_token::CurrentSession,
    models::session::{
        CleanupResponse, CreateSessionRequest, TransferRequest, TransferResponse,
        UpdateOrderDataRequest,
    },
    repositories::session as session_repo,
    state::AppState,
};

pub async fn list_sessions(
    State(state): State<AppState>,
    Path((restaurant_id, table_number)): Path<(Uuid, String)>,
) -> Result<Json<Vec<DeviceSession>>, AppError> {
    validate_table_path(&table_number)?;

    let rows = session_repo::list_active_sessions(&state.pool, restaurant_id, &table_number)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    Ok(Json(rows.into_iter().map(DeviceSession::from).collect()))
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<DeviceSession>), AppError> {
    payload.validate()?;

    // The device identity lives in the payload, so the creation budget is
    // checked here rather than in a layer.
    let window = Duration::from_secs(state.config.create_limit_window_secs.max(1));
    if let Err(retry_after) =
        check_session_create_limit(&payload.device_ip, state.config.create_limit_max, window)
    {
        return Err(AppError::RateLimited {
            message: "Too many sessions created from this device".to_string(),
            retry_after_secs: retry_after,
        });
    }

    let row = session_repo::create_session(
        &state.pool,
        &payload.session_token,
        &payload.device_ip,
        payload.restaurant_id,
        &payload.table_number,
        payload.is_main_device,
        payload.expires_at,
        &payload.order_data,
    )
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            if db_err.constraint() == Some("device_sessions_single_main_idx") {
                AppError::Conflict("Table already has a main device".to_string())
            } else {
                AppError::Conflict("Session token already registered".to_string())
            }
        }
        other => AppError::InternalServerError(other.into()),
    })?;

    let session = DeviceSession::from(row);
    tracing::info!(
        restaurant_id = %session.restaurant_id,
        table_number = %session.table_number,
        is_main_device = session.is_main_device,
        "Session created"
    );
    state.feed.publish(SessionEvent::Created {
        session: session.clone(),
    });

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn current_session(
    Extension(CurrentSession(row)): Extension<CurrentSession>,
) -> Json<DeviceSession> {
    Json(DeviceSession::from(row))
}

pub async fn update_order_data(
    State(state): State<AppState>,
    Extension(CurrentSession(current)): Extension<CurrentSession>,
    Json(payload): Json<UpdateOrderDataRequest>,
) -> Result<Json<DeviceSession>, AppError> {
    if !current.is_main_device {
        return Err(AppError::Forbidden(
            "Only the main device can update the cart".to_string(),
        ));
    }

    let snapshot = CartSnapshot::from_value(&payload.order_data)
        .map_err(|reason| AppError::BadRequest(format!("Invalid cart snapshot: {}", reason)))?;

    let row = session_repo::update_order_data(
        &state.pool,
        &current.session_token,
        &snapshot.to_value(),
    )
    .await
    .map_err(|e| AppError::InternalServerError(e.into()))?
    .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    let session = DeviceSession::from(row);
    state.feed.publish(SessionEvent::Updated {
        session: session.clone(),
    });
    Ok(Json(session))
}

pub async fn touch_session(
    State(state): State<AppState>,
    Extension(CurrentSession(current)): Extension<CurrentSession>,
) -> Result<Json<Value>, AppError> {
    let touched = session_repo::touch_session(&state.pool, &current.session_token)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    if !touched {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    Ok(Json(json!({ "message": "Session refreshed" })))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Extension(CurrentSession(current)): Extension<CurrentSession>,
) -> Result<Json<Value>, AppError> {
    let deleted = session_repo::delete_session(&state.pool, &current.session_token)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;

    // Deleting an already absent row still counts as done.
    if let Some(row) = deleted {
        state.feed.publish(SessionEvent::Deleted {
            restaurant_id: RestaurantId::from_uuid(row.restaurant_id),
            table_number: row.table_number,
            session_token: row.session_token,
        });
    }

    Ok(Json(json!({ "message": "Session ended" })))
}

pub async fn transfer_session(
    State(state): State<AppState>,
    Extension(CurrentSession(current)): Extension<CurrentSession>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    payload.validate()?;

    if payload.new_token != current.session_token {
        return Err(AppError::Forbidden(
            "Transfers must be requested by the incoming main device".to_string(),
        ));
    }
    if payload.old_token == payload.new_token {
        return Err(AppError::BadRequest(
            "Cannot transfer a session to itself".to_string(),
        ));
    }

    let promoted =
        session_repo::transfer_main_device(&state.pool, &payload.old_token, &payload.new_token)
            .await?;

    let Some(row) = promoted else {
        return Ok(Json(TransferResponse { transferred: false }));
    };

    let session = DeviceSession::from(row);
    tracing::info!(
        restaurant_id = %session.restaurant_id,
        table_number = %session.table_number,
        "Main role transferred"
    );
    state.feed.publish(SessionEvent::Transferred {
        old_token: payload.old_token,
        session: session.clone(),
    });

    Ok(Json(TransferResponse { transferred: true }))
}

pub async fn promote_session(
    State(state): State<AppState>,
    Extension(CurrentSession(current)): Extension<CurrentSession>,
) -> Result<Json<DeviceSession>, AppError> {
    let promoted = session_repo::promote_session(&state.pool, &current.session_token).await?;

    let Some(row) = promoted else {
        return Err(AppError::Conflict(
            "Another device already holds the main role".to_string(),
        ));
    };

    let session = DeviceSession::from(row);
    tracing::info!(
        restaurant_id = %session.restaurant_id,
        table_number = %session.table_number,
        "Session promoted to main"
    );
    // No old holder here, so peers learn about the role change as an update.
    state.feed.publish(SessionEvent::Updated {
        session: session.clone(),
    });

    Ok(Json(session))
}

pub async fn cleanup_table(
    State(state): State<AppState>,
    Path((restaurant_id, table_number)): Path<(Uuid, String)>,
) -> Result<Json<CleanupResponse>, AppError> {
    validate_table_path(&table_number)?;

    let removed = session_repo::cleanup_expired_sessions(&state.pool, restaurant_id, &table_number)
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))?;
    if removed > 0 {
        tracing::debug!(
            restaurant_id = %restaurant_id,
            table_number = %table_number,
            removed,
            "Swept expired sessions"
        );
    }
    Ok(Json(CleanupResponse { removed }))
}

fn validate_table_path(table_number: &str) -> Result<(), AppError> {
    crate::validation::rules::validate_table_number(table_number)
        .map_err(|_| AppError::BadRequest("Invalid table number".to_string()))
}
