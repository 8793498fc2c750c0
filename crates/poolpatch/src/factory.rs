//! HTTP-backed host sessions and update-info source
//!
//! The coordinator reaches pool members through their host agents, and host
//! agents read the pool repository's update-info from the coordinator.

use async_trait::async_trait;
use poolpatch_api::updates::HostUpdatesResponse;
use poolpatch_api::vm::VmRecord;
use poolpatch_client::{ClientError, HttpClient};
use poolpatch_core::{HostConfig, HostConnector, HostSession, SessionError, UpdateInfoSource};
use poolpatch_repo::metadata::{parse_metadata_index_str, parse_update_info_gz};
use poolpatch_repo::{RepoError, UpdateInfoIndex};
use tracing::debug;

fn session_error(err: ClientError) -> SessionError {
    match err {
        ClientError::Api { status: 401, .. } => SessionError::Unauthorized,
        ClientError::Api {
            status, message, ..
        } => SessionError::Rejected { status, message },
        other => SessionError::Transport(other.to_string()),
    }
}

/// Opens sessions with host agents over HTTP
pub struct HttpHostConnector {
    client: reqwest::Client,
    secret: String,
}

impl HttpHostConnector {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl HostConnector for HttpHostConnector {
    async fn login(&self, host: &HostConfig) -> Result<Box<dyn HostSession>, SessionError> {
        let client = HttpClient::with_client(&host.url, self.client.clone())
            .map_err(|e| SessionError::Transport(e.to_string()))?
            .login(&self.secret)
            .await
            .map_err(session_error)?;
        debug!(host = %host.name, "logged in to host agent");
        Ok(Box::new(HttpHostSession { client }))
    }
}

/// A logged-in session with one host agent
pub struct HttpHostSession {
    client: HttpClient,
}

#[async_trait]
impl HostSession for HttpHostSession {
    async fn updates(&self, installed: bool) -> Result<HostUpdatesResponse, SessionError> {
        self.client
            .host_updates(installed)
            .await
            .map_err(session_error)
    }

    async fn apply_updates(&self) -> Result<(), SessionError> {
        self.client.apply_host_updates().await.map_err(session_error)
    }

    async fn reboot(&self) -> Result<(), SessionError> {
        self.client.reboot_host().await.map_err(session_error)
    }

    async fn restart_toolstack(&self) -> Result<(), SessionError> {
        self.client.restart_toolstack().await.map_err(session_error)
    }

    async fn resident_vms(&self) -> Result<Vec<VmRecord>, SessionError> {
        self.client.resident_vms().await.map_err(session_error)
    }

    async fn migrate_local(&self, vm: &str) -> Result<(), SessionError> {
        self.client.migrate_local(vm).await.map_err(session_error)
    }

    async fn logout(&self) -> Result<(), SessionError> {
        self.client.logout().await.map_err(session_error)
    }
}

/// Reads update-info from the coordinator's pool repository endpoint
pub struct HttpUpdateInfoSource {
    client: HttpClient,
}

impl HttpUpdateInfoSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, RepoError> {
        self.client
            .repository_file(path)
            .await
            .map_err(|e| RepoError::Fetch {
                url: path.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl UpdateInfoSource for HttpUpdateInfoSource {
    async fn update_info(&self) -> Result<UpdateInfoIndex, RepoError> {
        let index = self.fetch("repodata/repomd.xml").await?;
        let index = String::from_utf8(index)
            .map_err(|e| RepoError::InvalidMetadata(format!("repomd.xml: {e}")))?;
        let metadata = parse_metadata_index_str(&index)?;

        let document = self.fetch(&metadata.location).await?;
        parse_update_info_gz(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_session_errors() {
        let unauthorized = ClientError::Api {
            status: 401,
            code: None,
            message: "bad secret".to_string(),
        };
        assert!(matches!(
            session_error(unauthorized),
            SessionError::Unauthorized
        ));

        let rejected = ClientError::Api {
            status: 500,
            code: Some("PACKAGE_ERROR".to_string()),
            message: "yum failed".to_string(),
        };
        assert!(matches!(
            session_error(rejected),
            SessionError::Rejected { status: 500, message } if message == "yum failed"
        ));

        let invalid = HttpClient::new("not a url").unwrap_err();
        assert!(matches!(session_error(invalid), SessionError::Transport(_)));
    }

    #[tokio::test]
    async fn test_login_to_invalid_url() {
        let connector = HttpHostConnector::new("s3cret");
        let host = HostConfig {
            name: "broken".to_string(),
            url: "not a url".to_string(),
        };
        assert!(matches!(
            connector.login(&host).await,
            Err(SessionError::Transport(_))
        ));
    }
}
