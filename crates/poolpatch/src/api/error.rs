//! API error types
//!
//! Every failure leaves the daemon as `{"code","message"}` JSON with a
//! status chosen from the error kind.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kameo::error::SendError;
use poolpatch_api::responses::ErrorResponse;
use poolpatch_core::CoreError;
use poolpatch_core::error::from_send_error;
use tracing::warn;

use crate::control::ControlError;

/// Wrapper for API errors with status codes
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: ErrorResponse,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ErrorResponse {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// Map a failed `ask` to the `PoolActor`
    pub fn from_send<M>(err: SendError<M, CoreError>) -> Self {
        from_send_error(err).into()
    }
}

/// HTTP status for a core error
#[must_use]
pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::RepositoryAlreadyExists(_)
        | CoreError::HostAlreadyExists(_)
        | CoreError::RepositoryInUse(_)
        | CoreError::SyncAlreadyInProgress
        | CoreError::UpdatesRequireSync { .. } => StatusCode::CONFLICT,
        CoreError::RepositoryNotFound(_) | CoreError::HostNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::NoRepositoryEnabled => StatusCode::BAD_REQUEST,
        CoreError::GetHostUpdatesFailed { .. }
        | CoreError::GetPoolUpdatesFailed { .. }
        | CoreError::ApplyUpdatesFailed { .. }
        | CoreError::ApplyGuidanceFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            warn!(code = err.code(), error = %err, "request failed");
        }
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<ControlError> for AppError {
    fn from(err: ControlError) -> Self {
        warn!(error = %err, "host control failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "HOST_CONTROL_FAILED",
            err.to_string(),
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
