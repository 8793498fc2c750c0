//! Coordinator endpoints: pool sync, update reports, application and
//! pool membership

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use poolpatch_api::requests::{ApplyUpdatesRequest, PoolUpdatesQuery, RegisterHostRequest};
use poolpatch_api::responses::{ApplyUpdatesResponse, HostResponse, SyncResponse};
use poolpatch_api::updates::PoolUpdatesResponse;
use poolpatch_core::{HostConfig, ListHosts, RegisterHost, UnregisterHost};

use crate::api::error::AppError;
use crate::state::AppState;

fn host_response(config: HostConfig) -> HostResponse {
    HostResponse {
        name: config.name,
        url: config.url,
    }
}

/// Sync the enabled repository and compute pool update status
///
/// # Errors
/// Returns `AppError` with 409 while another sync runs, or the failure of
/// any sync step
pub async fn sync(State(state): State<Arc<AppState>>) -> Result<Json<SyncResponse>, AppError> {
    Ok(Json(state.orchestrator.sync_pool_repository().await?))
}

/// Updates every host (or the requested hosts) needs, with guidance
///
/// # Errors
/// Returns `AppError` with 409 if the mirror changed since the last sync,
/// 502 if any host could not be queried
pub async fn updates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PoolUpdatesQuery>,
) -> Result<Json<PoolUpdatesResponse>, AppError> {
    let report = state
        .orchestrator
        .consolidate_pool_updates(query.host_names())
        .await?;
    Ok(Json(report))
}

/// Apply updates to a host and execute its guidance
///
/// # Errors
/// Returns `AppError` with 502 if applying or remediation fails
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
    Json(req): Json<ApplyUpdatesRequest>,
) -> Result<Json<ApplyUpdatesResponse>, AppError> {
    let guidance = state.orchestrator.apply_updates(&host, &req.hash).await?;
    Ok(Json(ApplyUpdatesResponse { guidance }))
}

/// # Errors
/// Returns `AppError` if the pool actor is unavailable
pub async fn list_hosts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HostResponse>>, AppError> {
    let hosts = state
        .pool
        .ask(ListHosts)
        .await
        .map_err(|e| AppError::internal(format!("failed to list hosts: {e}")))?;
    Ok(Json(hosts.into_iter().map(host_response).collect()))
}

/// # Errors
/// Returns `AppError` with 409 for a duplicate name
pub async fn register_host(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterHostRequest>,
) -> Result<(StatusCode, Json<HostResponse>), AppError> {
    let config = HostConfig {
        name: req.name,
        url: req.url,
    };

    state
        .pool
        .ask(RegisterHost {
            config: config.clone(),
        })
        .await
        .map_err(AppError::from_send)?;

    Ok((StatusCode::CREATED, Json(host_response(config))))
}

/// # Errors
/// Returns `AppError` with 404 for an unknown host
pub async fn unregister_host(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .pool
        .ask(UnregisterHost { name })
        .await
        .map_err(AppError::from_send)?;
    Ok(StatusCode::NO_CONTENT)
}
