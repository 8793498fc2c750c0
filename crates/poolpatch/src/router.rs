//! HTTP router configuration
//!
//! One router serves both roles: every member answers the host agent
//! endpoints, and the coordinator endpoints drive the pool.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::api::{host, pool, repository, session, system};
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        // Host agent
        .route("/updates", get(host::updates))
        .route("/updates/apply", post(host::apply))
        .route("/host/reboot", post(host::reboot))
        .route("/host/toolstack/restart", post(host::restart_toolstack))
        .route("/host/vms", get(host::vms))
        .route("/host/vms/{uuid}/migrate-local", post(host::migrate_local))
        // Repositories
        .route(
            "/repositories",
            get(repository::list).post(repository::introduce),
        )
        .route("/repositories/{name}", delete(repository::forget))
        // Pool
        .route("/pool/repository", put(repository::enable))
        .route("/pool/sync", post(pool::sync))
        .route("/pool/updates", get(pool::updates))
        .route("/pool/hosts", get(pool::list_hosts).post(pool::register_host))
        .route("/pool/hosts/{name}", delete(pool::unregister_host))
        .route("/pool/hosts/{name}/apply", post(pool::apply))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            session::require_session,
        ));

    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        .route("/openapi.json", get(system::openapi))
        .route("/session", post(session::login))
        .route("/session/{id}", delete(session::logout))
        // Gated by pool-repository access rather than sessions
        .route("/repository/{*path}", get(repository::serve_file))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use poolpatch_api::responses::{ErrorResponse, SessionResponse};
    use poolpatch_client::SESSION_HEADER;
    use poolpatch_core::{IntroduceRepository, Repository};
    use poolpatch_exec::LocalExecutor;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    const SECRET: &str = "s3cret";

    fn test_state(root: &std::path::Path) -> Arc<AppState> {
        let mut config = Config::default();
        config.daemon.session_secret = SECRET.to_string();
        config.mirror.mirror_root = root.join("mirror");
        config.mirror.repos_dir = root.join("repos.d");
        Arc::new(AppState::new(config, Arc::new(LocalExecutor::new())).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json(method: &str, uri: &str, body: &str, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn login(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(json("POST", "/session", r#"{"secret":"s3cret"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session: SessionResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        session.session
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app.oneshot(get("/openapi.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(doc["components"]["schemas"]["PoolUpdatesResponse"].is_object());
    }

    #[tokio::test]
    async fn test_session_required() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app.clone().oneshot(get("/pool/hosts")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(json("POST", "/session", r#"{"secret":"wrong"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let session = login(&app).await;
        let request = Request::builder()
            .uri("/pool/hosts")
            .header(SESSION_HEADER, &session)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"[]");

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/session/{session}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let request = Request::builder()
            .uri("/pool/hosts")
            .header(SESSION_HEADER, &session)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_pool_repository_gate() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = create_router(Arc::clone(&state));

        let repodata = dir.path().join("mirror/base/repodata");
        std::fs::create_dir_all(&repodata).unwrap();
        std::fs::write(repodata.join("repomd.xml"), "<repomd/>").unwrap();

        state
            .pool
            .ask(IntroduceRepository {
                repository: Repository::new("base", "", "https://updates.example.com/base/", ""),
            })
            .await
            .unwrap();
        state
            .orchestrator
            .enable_repository(Some("base".to_string()))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(get("/repository/repodata/repomd.xml"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        {
            let _access = state.locks().pool_repository().await;

            let response = app
                .clone()
                .oneshot(get("/repository/repodata/repomd.xml"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_bytes(response).await, b"<repomd/>");

            let response = app
                .clone()
                .oneshot(get("/repository/repodata/missing.xml"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let response = app
            .oneshot(get("/repository/repodata/repomd.xml"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_repository_errors_map_to_status() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));
        let session = login(&app).await;
        let body = r#"{"name":"base","binary_url":"https://updates.example.com/base/"}"#;

        let response = app
            .clone()
            .oneshot(json("POST", "/repositories", body, Some(&session)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json("POST", "/repositories", body, Some(&session)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(error.code, "REPOSITORY_ALREADY_EXISTS");

        let request = Request::builder()
            .method("DELETE")
            .uri("/repositories/missing")
            .header(SESSION_HEADER, &session)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(json("POST", "/pool/sync", "", Some(&session)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(error.code, "NO_REPOSITORY_ENABLED");
    }
}
