//! Host update queries
//!
//! `LocalUpdateQuery` runs on a pool member and answers what that host needs
//! from the pool repository. `query_remote` is the coordinator side of the
//! same question, asked through a host session.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use poolpatch_api::updates::{HostUpdate, HostUpdatesResponse};
use poolpatch_repo::{
    PackageManager, PackageVersion, RepoConfig, RepoError, ScopedRepoConfig, UpdateInfoIndex,
    UpgradablePackage, UpgradeResult,
};
use tracing::{debug, info, instrument};

use crate::config::{HostConfig, MirrorConfig};
use crate::error::CoreError;
use crate::host::{HostConnector, SessionGuard};

/// Supplies the update-info index of the pool repository
#[async_trait]
pub trait UpdateInfoSource: Send + Sync {
    async fn update_info(&self) -> Result<UpdateInfoIndex, RepoError>;
}

/// Answers update queries for the host it runs on
pub struct LocalUpdateQuery {
    host_name: String,
    package_manager: Arc<dyn PackageManager>,
    source: Arc<dyn UpdateInfoSource>,
    repo: RepoConfig,
    repos_dir: PathBuf,
}

impl LocalUpdateQuery {
    pub fn new(
        host_name: impl Into<String>,
        mirror: &MirrorConfig,
        package_manager: Arc<dyn PackageManager>,
        source: Arc<dyn UpdateInfoSource>,
    ) -> Self {
        Self {
            host_name: host_name.into(),
            package_manager,
            source,
            repo: RepoConfig::new(
                mirror.local_repo_id.clone(),
                mirror.local_repository_url(),
                mirror.gpgcheck,
            ),
            repos_dir: mirror.repos_dir.clone(),
        }
    }

    fn query_failed(&self, reason: impl ToString) -> CoreError {
        CoreError::GetHostUpdatesFailed {
            host: self.host_name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Updates this host can take from the pool repository
    ///
    /// With `installed`, each update also carries the currently installed
    /// version.
    ///
    /// # Errors
    /// Returns `CoreError::GetHostUpdatesFailed` if the package manager or
    /// the update-info source fails
    #[instrument(skip(self), fields(host = %self.host_name))]
    pub async fn query(&self, installed: bool) -> Result<HostUpdatesResponse, CoreError> {
        let _repo = ScopedRepoConfig::enable(&self.repo, &self.repos_dir)
            .map_err(|e| self.query_failed(e))?;

        let index = self
            .source
            .update_info()
            .await
            .map_err(|e| self.query_failed(e))?;

        let available = self
            .package_manager
            .list_updates(&self.repo.id)
            .await
            .map_err(|e| self.query_failed(e))?;

        let installed_versions = if installed {
            let packages = self
                .package_manager
                .list_installed()
                .await
                .map_err(|e| self.query_failed(e))?;
            Some(installed_map(packages))
        } else {
            None
        };

        let updates = cross_reference(&index, available, installed_versions.as_ref());
        info!(count = updates.len(), "host update query finished");
        Ok(HostUpdatesResponse { updates })
    }

    /// Install every update the pool repository offers this host
    ///
    /// # Errors
    /// Returns `CoreError::ApplyUpdatesFailed` if the package manager fails
    #[instrument(skip(self), fields(host = %self.host_name))]
    pub async fn apply(&self) -> Result<UpgradeResult, CoreError> {
        let apply_failed = |reason: String| CoreError::ApplyUpdatesFailed {
            host: self.host_name.clone(),
            source: Box::new(CoreError::PackageError(reason)),
        };

        let _repo = ScopedRepoConfig::enable(&self.repo, &self.repos_dir)
            .map_err(|e| apply_failed(e.to_string()))?;

        self.package_manager
            .upgrade(&self.repo.id)
            .await
            .map_err(|e| apply_failed(e.to_string()))
    }
}

fn installed_map(packages: Vec<UpgradablePackage>) -> HashMap<(String, String), PackageVersion> {
    packages
        .into_iter()
        .map(|pkg| ((pkg.name, pkg.arch), pkg.version))
        .collect()
}

/// Keep only packages some update names, attaching that update's id
///
/// When several updates ship the same build the lowest id wins, so the
/// answer does not depend on index order.
fn cross_reference(
    index: &UpdateInfoIndex,
    available: Vec<UpgradablePackage>,
    installed: Option<&HashMap<(String, String), PackageVersion>>,
) -> Vec<HostUpdate> {
    let mut updates = Vec::new();

    for pkg in available {
        let update_id = index
            .values()
            .filter(|info| info.packages.iter().any(|p| p.matches(&pkg)))
            .map(|info| info.id.as_str())
            .min();

        let Some(update_id) = update_id else {
            debug!(package = %pkg.name, "no update-info entry for package, dropping");
            continue;
        };

        let old_version = installed.and_then(|versions| {
            versions
                .get(&(pkg.name.clone(), pkg.arch.clone()))
                .map(ToString::to_string)
        });

        updates.push(HostUpdate {
            update_id: update_id.to_string(),
            new_version: pkg.version.to_string(),
            old_version,
            name: pkg.name,
            arch: pkg.arch,
            repository: pkg.repository,
        });
    }

    updates
}

/// Ask `host` for its updates through a fresh session
///
/// # Errors
/// Returns `CoreError::GetHostUpdatesFailed` on any login or transport failure
pub async fn query_remote(
    connector: &dyn HostConnector,
    host: &HostConfig,
    installed: bool,
) -> Result<HostUpdatesResponse, CoreError> {
    let failed = |reason: String| CoreError::GetHostUpdatesFailed {
        host: host.name.clone(),
        reason,
    };

    let guard = SessionGuard::open(connector, host)
        .await
        .map_err(|e| failed(e.to_string()))?;
    let result = guard
        .session()
        .updates(installed)
        .await
        .map_err(|e| failed(e.to_string()));
    guard.end().await;

    result
}
