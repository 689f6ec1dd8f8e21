use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tableside_client::SESSION_TOKEN_HEADER;
use tableside_client::token::is_valid_token;

use crate::{error::AppError, models::session::SessionRow, repositories, state::AppState};

/// The caller's session row, resolved from the `x-session-token` header.
#[derive(Clone, Debug)]
pub struct CurrentSession(pub SessionRow);

/// Resolves the session token header to a live session row and stores it in
/// the request extensions. Expired or unknown tokens are rejected before the
/// handler runs.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing session token".to_string()))?;

    if !is_valid_token(&token) {
        return Err(AppError::Unauthorized("Malformed session token".to_string()));
    }

    let row = repositories::session::find_session_by_token(&state.pool, &token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown or expired session token".to_string()))?;

    request.extensions_mut().insert(CurrentSession(row));
    Ok(next.run(request).await)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
