//! Session endpoints and the session check for authenticated routes

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use poolpatch_api::requests::LoginRequest;
use poolpatch_api::responses::SessionResponse;
use poolpatch_client::SESSION_HEADER;
use tracing::info;

use crate::api::error::AppError;
use crate::state::AppState;

/// Open a session with the pool secret
///
/// # Errors
/// Returns `AppError` with 401 for a wrong secret
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .sessions
        .login(&req.secret)
        .ok_or_else(|| AppError::unauthorized("invalid secret"))?;
    info!("session opened");
    Ok(Json(SessionResponse { session }))
}

/// Close a session; closing an unknown session is not an error
pub async fn logout(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    state.sessions.logout(&id);
    StatusCode::NO_CONTENT
}

/// Reject requests without a valid session header
///
/// # Errors
/// Returns `AppError` with 401 if the header is missing or unknown
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let valid = req
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|session| state.sessions.is_valid(session));

    if !valid {
        return Err(AppError::unauthorized("missing or invalid session"));
    }
    Ok(next.run(req).await)
}
