//! Host agent endpoints
//!
//! Served by every pool member; the coordinator calls these through a
//! session to query, update and remediate the host.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use poolpatch_api::requests::UpdatesQuery;
use poolpatch_api::updates::HostUpdatesResponse;
use poolpatch_api::vm::VmRecord;
use tracing::info;

use crate::api::error::AppError;
use crate::state::AppState;

/// Updates this host can take from the pool repository
///
/// # Errors
/// Returns `AppError` if the package manager or update-info fetch fails
pub async fn updates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UpdatesQuery>,
) -> Result<Json<HostUpdatesResponse>, AppError> {
    Ok(Json(state.updates.query(query.installed).await?))
}

/// Install every update the pool repository offers this host
///
/// # Errors
/// Returns `AppError` if the package manager fails
pub async fn apply(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    let result = state.updates.apply().await?;
    info!(upgraded = result.upgraded_count, "host updates applied");
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
/// Returns `AppError` if no reboot command is configured
pub async fn reboot(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.control.reboot()?;
    Ok(StatusCode::ACCEPTED)
}

/// # Errors
/// Returns `AppError` if the restart command fails
pub async fn restart_toolstack(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.control.restart_toolstack().await?;
    Ok(StatusCode::ACCEPTED)
}

/// # Errors
/// Returns `AppError` if `xe` fails
pub async fn vms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<VmRecord>>, AppError> {
    Ok(Json(state.control.resident_vms().await?))
}

/// # Errors
/// Returns `AppError` if the migration fails
pub async fn migrate_local(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, AppError> {
    state.control.migrate_local(&uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}
