//! WebSocket endpoint streaming session change events for one table.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use tableside_client::events::SessionEvent;
use tableside_client::types::RestaurantId;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub async fn session_feed(
    State(state): State<AppState>,
    Path((restaurant_id, table_number)): Path<(Uuid, String)>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    crate::validation::rules::validate_table_number(&table_number)
        .map_err(|_| AppError::BadRequest("Invalid table number".to_string()))?;

    // Subscribe before the upgrade completes so no event slips through the gap.
    let rx = state.feed.subscribe();
    let scope = RestaurantId::from_uuid(restaurant_id);
    Ok(ws.on_upgrade(move |socket| run_feed_socket(socket, rx, scope, table_number)))
}

async fn run_feed_socket(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<Arc<SessionEvent>>,
    restaurant_id: RestaurantId,
    table_number: String,
) {
    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    // The feed is one-way; ignore anything the client sends.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(?e, "feed socket read error");
                        break;
                    }
                }
            }
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !event.matches_scope(&restaurant_id, &table_number) {
                            continue;
                        }
                        let json = match serde_json::to_string(event.as_ref()) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!(?e, "failed to encode feed event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            table_number = %table_number,
                            skipped = n,
                            "feed socket lagged behind broadcast"
                        );
                        // Missed events are recovered by the client's reconcile.
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}
