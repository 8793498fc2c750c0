//! HTTP client for poolpatch agents and coordinators

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use poolpatch_api::{
    requests::{
        ApplyUpdatesRequest, EnableRepositoryRequest, IntroduceRepositoryRequest, LoginRequest,
        RegisterHostRequest,
    },
    responses::{
        ApplyUpdatesResponse, ErrorResponse, HealthResponse, HostResponse, RepositoryResponse,
        SessionResponse, SyncResponse,
    },
    updates::{HostUpdatesResponse, PoolUpdatesResponse},
    vm::VmRecord,
};

use crate::error::{ClientError, Result};

/// Header carrying the session id on authenticated requests
pub const SESSION_HEADER: &str = "x-poolpatch-session";

/// HTTP client for one poolpatch daemon
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    session: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use poolpatch_client::HttpClient;
    ///
    /// let client = HttpClient::new("http://localhost:8080")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new HTTP client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self {
            client,
            base_url,
            session: None,
        })
    }

    /// Use an existing session for authenticated requests
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Build a full URL from a path
    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(ClientError::Url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.session {
            Some(session) => builder.header(SESSION_HEADER, session),
            None => builder,
        }
    }

    /// Turn a non-success status into `ClientError::Api`
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let status = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => (Some(error.code), error.message),
            Err(_) => (None, body),
        };
        Err(ClientError::Api {
            status,
            code,
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = Self::check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: impl serde::Serialize) -> Result<T> {
        let url = self.url(path)?;
        self.send_json(self.request(Method::POST, url).json(&body))
            .await
    }

    /// POST without a body, ignoring any response body
    async fn trigger(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        self.send_empty(self.request(Method::POST, url)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        self.send_empty(self.request(Method::DELETE, url)).await
    }

    // System endpoints

    /// Get daemon health status
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    /// Open a session and return a client that uses it
    ///
    /// # Errors
    /// Returns `ClientError::Api` with status 401 for a wrong secret.
    ///
    /// # Example
    /// ```no_run
    /// # use poolpatch_client::HttpClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = HttpClient::new("http://host-1:8080")?.login("pool-secret").await?;
    /// let updates = client.host_updates(true).await?;
    /// client.logout().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn login(&self, secret: &str) -> Result<Self> {
        let response: SessionResponse = self
            .post(
                "/session",
                LoginRequest {
                    secret: secret.to_string(),
                },
            )
            .await?;
        debug!(url = %self.base_url, "session opened");
        Ok(self.clone().with_session(response.session))
    }

    /// Close the current session; a client without one does nothing
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn logout(&self) -> Result<()> {
        match &self.session {
            Some(session) => self.delete(&format!("/session/{session}")).await,
            None => Ok(()),
        }
    }

    // Host agent endpoints

    /// Updates this host can take from the pool repository
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn host_updates(&self, installed: bool) -> Result<HostUpdatesResponse> {
        let mut url = self.url("/updates")?;
        url.query_pairs_mut()
            .append_pair("installed", if installed { "true" } else { "false" });
        self.send_json(self.request(Method::GET, url)).await
    }

    /// Install every update the pool repository offers this host
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn apply_host_updates(&self) -> Result<()> {
        self.trigger("/updates/apply").await
    }

    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn reboot_host(&self) -> Result<()> {
        self.trigger("/host/reboot").await
    }

    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn restart_toolstack(&self) -> Result<()> {
        self.trigger("/host/toolstack/restart").await
    }

    /// VMs resident on this host
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn resident_vms(&self) -> Result<Vec<VmRecord>> {
        self.get("/host/vms").await
    }

    /// Live-migrate `vm` onto the host it runs on
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn migrate_local(&self, vm: &str) -> Result<()> {
        self.trigger(&format!("/host/vms/{vm}/migrate-local")).await
    }

    // Coordinator endpoints

    /// Fetch a file from the enabled pool repository
    ///
    /// # Errors
    /// Returns `ClientError::Api` with status 403 while pool-repository
    /// access is closed.
    pub async fn repository_file(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("/repository/{}", path.trim_start_matches('/')))?;
        let response = Self::check(self.request(Method::GET, url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn list_repositories(&self) -> Result<Vec<RepositoryResponse>> {
        self.get("/repositories").await
    }

    /// # Errors
    /// Returns `ClientError::Api` with status 409 if the name or binary URL
    /// is already taken.
    pub async fn introduce_repository(
        &self,
        request: IntroduceRepositoryRequest,
    ) -> Result<RepositoryResponse> {
        self.post("/repositories", request).await
    }

    /// # Errors
    /// Returns `ClientError::Api` with status 409 while the repository is enabled.
    pub async fn forget_repository(&self, name: &str) -> Result<()> {
        self.delete(&format!("/repositories/{name}")).await
    }

    /// Enable `name` for the pool, or disable pool updates with `None`
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn enable_repository(&self, name: Option<String>) -> Result<()> {
        let url = self.url("/pool/repository")?;
        self.send_empty(
            self.request(Method::PUT, url)
                .json(&EnableRepositoryRequest { name }),
        )
        .await
    }

    /// Sync the enabled repository and compute pool update status
    ///
    /// # Errors
    /// Returns `ClientError::Api` with status 409 while another sync runs.
    pub async fn sync_pool(&self) -> Result<SyncResponse> {
        let url = self.url("/pool/sync")?;
        self.send_json(self.request(Method::POST, url)).await
    }

    /// Updates every host (or only `hosts`) needs, with guidance
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn pool_updates(&self, hosts: Option<&[String]>) -> Result<PoolUpdatesResponse> {
        let mut url = self.url("/pool/updates")?;
        if let Some(hosts) = hosts {
            url.query_pairs_mut().append_pair("hosts", &hosts.join(","));
        }
        self.send_json(self.request(Method::GET, url)).await
    }

    /// Apply updates to `host` and execute its guidance
    ///
    /// `hash` is the checksum from the pool report the caller acted on.
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn apply_updates(&self, host: &str, hash: &str) -> Result<ApplyUpdatesResponse> {
        self.post(
            &format!("/pool/hosts/{host}/apply"),
            ApplyUpdatesRequest {
                hash: hash.to_string(),
            },
        )
        .await
    }

    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn list_hosts(&self) -> Result<Vec<HostResponse>> {
        self.get("/pool/hosts").await
    }

    /// # Errors
    /// Returns `ClientError::Api` with status 409 for a duplicate name.
    pub async fn register_host(&self, request: RegisterHostRequest) -> Result<HostResponse> {
        self.post("/pool/hosts", request).await
    }

    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn unregister_host(&self, name: &str) -> Result<()> {
        self.delete(&format!("/pool/hosts/{name}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new("http://localhost:8080");
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let client = HttpClient::new("not a url");
        assert!(client.is_err());
    }

    #[test]
    fn test_url_building() {
        let client = HttpClient::new("http://localhost:8080").unwrap();
        let url = client.url("/pool/hosts").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/pool/hosts");
    }

    #[test]
    fn test_session_header() {
        let client = HttpClient::new("http://localhost:8080").unwrap();
        let url = client.url("/updates").unwrap();

        let request = client.request(Method::GET, url.clone()).build().unwrap();
        assert!(request.headers().get(SESSION_HEADER).is_none());

        let client = client.with_session("abc");
        assert_eq!(client.session(), Some("abc"));
        let request = client.request(Method::GET, url).build().unwrap();
        assert_eq!(request.headers().get(SESSION_HEADER).unwrap(), "abc");
    }

    #[test]
    fn test_api_error_status() {
        let error = ClientError::Api {
            status: 409,
            code: Some("SYNC_ALREADY_IN_PROGRESS".to_string()),
            message: "sync already in progress".to_string(),
        };
        assert_eq!(error.status(), Some(409));
        assert_eq!(error.to_string(), "API error (409): sync already in progress");
    }
}
