//! Repository management and the pool repository endpoint

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use poolpatch_api::requests::{EnableRepositoryRequest, IntroduceRepositoryRequest};
use poolpatch_api::responses::RepositoryResponse;
use poolpatch_core::{ForgetRepository, GetEnabledRepository, IntroduceRepository, ListRepositories, Repository};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::api::error::AppError;
use crate::state::AppState;

/// # Errors
/// Returns `AppError` if the pool actor is unavailable
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RepositoryResponse>>, AppError> {
    let repositories = state
        .pool
        .ask(ListRepositories)
        .await
        .map_err(|e| AppError::internal(format!("failed to list repositories: {e}")))?;
    Ok(Json(repositories))
}

/// # Errors
/// Returns `AppError` with 409 if the name or binary URL is taken
pub async fn introduce(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IntroduceRepositoryRequest>,
) -> Result<(StatusCode, Json<RepositoryResponse>), AppError> {
    let repository = Repository::from(req);
    let response = repository.to_response(false);

    state
        .pool
        .ask(IntroduceRepository { repository })
        .await
        .map_err(AppError::from_send)?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// # Errors
/// Returns `AppError` with 409 while the repository is enabled
pub async fn forget(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .pool
        .ask(ForgetRepository { name })
        .await
        .map_err(AppError::from_send)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Enable a repository for the pool, or disable pool updates
///
/// # Errors
/// Returns `AppError` with 409 while a sync runs
pub async fn enable(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EnableRepositoryRequest>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.enable_repository(req.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Serve a file from the enabled mirror
///
/// Hosts read the pool repository through here, and only while the
/// coordinator has opened pool-repository access.
///
/// # Errors
/// Returns `AppError` with 403 while access is closed
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    req: Request,
) -> Result<Response, AppError> {
    if !state.locks().pool_repository_enabled() {
        return Err(AppError::forbidden("pool repository access is disabled"));
    }

    let repository = state
        .pool
        .ask(GetEnabledRepository)
        .await
        .map_err(AppError::from_send)?;
    let dir = state.config.mirror.mirror_root.join(&repository.name);

    let file_request = Request::builder()
        .method(req.method().clone())
        .uri(format!("/{path}"))
        .body(Body::empty())
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, "INVALID_PATH", e.to_string()))?;

    let Ok(response) = ServeDir::new(dir).oneshot(file_request).await;
    Ok(response.into_response())
}
