//! Sessions with host agents
//!
//! The coordinator talks to each pool member through a short-lived session:
//! log in right before use, log out on every exit path.

use std::sync::Arc;

use async_trait::async_trait;
use poolpatch_api::updates::HostUpdatesResponse;
use poolpatch_api::vm::VmRecord;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HostConfig;

/// Failures talking to a host agent
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// The host rejected our credentials
    #[error("login rejected by host")]
    Unauthorized,

    /// The host could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// The host answered with an error
    #[error("host returned {status}: {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Error message from the host
        message: String,
    },
}

/// Opens sessions with pool members
#[async_trait]
pub trait HostConnector: Send + Sync {
    /// Log in to `host`
    async fn login(&self, host: &HostConfig) -> Result<Box<dyn HostSession>, SessionError>;
}

/// An authenticated session with one host agent
#[async_trait]
pub trait HostSession: Send + Sync {
    /// Updates the host can take from the pool repository
    async fn updates(&self, installed: bool) -> Result<HostUpdatesResponse, SessionError>;

    /// Install every available update from the pool repository
    async fn apply_updates(&self) -> Result<(), SessionError>;

    async fn reboot(&self) -> Result<(), SessionError>;

    async fn restart_toolstack(&self) -> Result<(), SessionError>;

    /// VMs resident on the host
    async fn resident_vms(&self) -> Result<Vec<VmRecord>, SessionError>;

    /// Live-migrate `vm` onto the host it already runs on, restarting its
    /// device model
    async fn migrate_local(&self, vm: &str) -> Result<(), SessionError>;

    async fn logout(&self) -> Result<(), SessionError>;
}

/// A logged-in session that is logged out on every exit path
///
/// Call [`SessionGuard::end`] to log out in place. A guard dropped before
/// that, for example when the owning future is cancelled, logs out on a
/// spawned task instead.
pub struct SessionGuard {
    host: String,
    session: Arc<dyn HostSession>,
    ended: bool,
}

impl SessionGuard {
    /// Log in to `host` through `connector`
    ///
    /// # Errors
    /// Returns the connector's `SessionError`
    pub async fn open(
        connector: &dyn HostConnector,
        host: &HostConfig,
    ) -> Result<Self, SessionError> {
        let session = connector.login(host).await?;
        Ok(Self {
            host: host.name.clone(),
            session: Arc::from(session),
            ended: false,
        })
    }

    #[must_use]
    pub fn session(&self) -> &dyn HostSession {
        self.session.as_ref()
    }

    /// Log out now
    pub async fn end(mut self) {
        end_session(&self.host, self.session.as_ref()).await;
        self.ended = true;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        let host = std::mem::take(&mut self.host);
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(host = %host, "session abandoned, logging out in background");
                handle.spawn(async move { end_session(&host, session.as_ref()).await });
            }
            Err(_) => warn!(host = %host, "session abandoned outside a runtime, not logged out"),
        }
    }
}

/// Log out, logging rather than returning a failure so it never replaces
/// the result of the work done in the session
async fn end_session(host: &str, session: &dyn HostSession) {
    match session.logout().await {
        Ok(()) => debug!(host, "session closed"),
        Err(e) => warn!(host, error = %e, "failed to log out of host session"),
    }
}
