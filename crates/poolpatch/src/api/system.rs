//! Health and API description endpoints

use axum::Json;
use poolpatch_api::{
    Guidance,
    events::PoolEvent,
    requests::{
        ApplyUpdatesRequest, EnableRepositoryRequest, IntroduceRepositoryRequest, LoginRequest,
        PoolUpdatesQuery, RegisterHostRequest, UpdatesQuery,
    },
    responses::{
        ApplyUpdatesResponse, ErrorResponse, HealthResponse, HostResponse, RepositoryResponse,
        SessionResponse, SyncResponse,
    },
    updates::{HostUpdate, HostUpdateSummary, HostUpdatesResponse, PoolUpdatesResponse, UpdateDetail},
    vm::{PowerState, VmRecord},
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "poolpatch", description = "Pool-wide software update orchestration"),
    components(schemas(
        Guidance,
        PoolEvent,
        LoginRequest,
        UpdatesQuery,
        PoolUpdatesQuery,
        IntroduceRepositoryRequest,
        EnableRepositoryRequest,
        RegisterHostRequest,
        ApplyUpdatesRequest,
        HealthResponse,
        SessionResponse,
        ErrorResponse,
        RepositoryResponse,
        HostResponse,
        SyncResponse,
        ApplyUpdatesResponse,
        HostUpdate,
        HostUpdatesResponse,
        HostUpdateSummary,
        UpdateDetail,
        PoolUpdatesResponse,
        PowerState,
        VmRecord,
    ))
)]
pub struct ApiDoc;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
