//! Package manager traits

use async_trait::async_trait;

use crate::error::RepoError;
use crate::types::{UpgradablePackage, UpgradeResult};

/// The host's package manager, always used against one explicitly enabled
/// repository id
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Packages with a newer build available from `repo_id`
    async fn list_updates(&self, repo_id: &str) -> Result<Vec<UpgradablePackage>, RepoError>;

    /// Packages currently installed
    async fn list_installed(&self) -> Result<Vec<UpgradablePackage>, RepoError>;

    /// Upgrade everything `repo_id` has a newer build for
    async fn upgrade(&self, repo_id: &str) -> Result<UpgradeResult, RepoError>;

    /// Drop cached metadata for `repo_id`
    async fn clean_metadata(&self, repo_id: &str) -> Result<(), RepoError>;
}
