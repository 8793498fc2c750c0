//! Repository mirroring and local repository rebuild
//!
//! Every operation takes the `SyncGuard`, so only the holder of the sync
//! lock can touch the mirror.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use poolpatch_exec::CommandExecutor;
use poolpatch_repo::config::{config_path, remove_config};
use poolpatch_repo::{
    MetadataStore, PackageManager, RepoConfig, RepoError, UpdateInfoMetadata, YumManager, tools,
};
use tracing::{debug, info, instrument};

use crate::config::MirrorConfig;
use crate::error::CoreError;
use crate::locks::SyncGuard;
use crate::state::Repository;

/// Mirrors repositories and rebuilds them into the pool repository
pub struct RepositorySync {
    executor: Arc<dyn CommandExecutor>,
    package_manager: Arc<dyn PackageManager>,
    store: MetadataStore,
    repos_dir: PathBuf,
    gpgcheck: bool,
}

impl RepositorySync {
    pub fn new(executor: Arc<dyn CommandExecutor>, mirror: &MirrorConfig) -> Self {
        let package_manager = Arc::new(YumManager::new(
            Arc::clone(&executor),
            mirror.package_tool.clone(),
        ));
        Self {
            executor,
            package_manager,
            store: MetadataStore::new(mirror.mirror_root.clone()),
            repos_dir: mirror.repos_dir.clone(),
            gpgcheck: mirror.gpgcheck,
        }
    }

    #[must_use]
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Refresh the mirror of `repository` from its binary URL
    ///
    /// On failure the previous mirror is left as it was.
    ///
    /// # Errors
    /// Returns `CoreError::SyncFailed` if the config cannot be written or the
    /// mirroring tool fails
    #[instrument(skip(self, _guard, repository), fields(repository = %repository.name))]
    pub async fn sync(&self, _guard: &SyncGuard, repository: &Repository) -> Result<(), CoreError> {
        let failed = |e: RepoError| CoreError::SyncFailed {
            repository: repository.name.clone(),
            reason: e.to_string(),
        };

        let config = RepoConfig::new(&repository.name, &repository.binary_url, self.gpgcheck);
        let config_file = config.write(&self.repos_dir).map_err(failed)?;

        let cmd = tools::reposync(
            &config_file,
            self.store.mirror_root(),
            &repository.name,
            self.gpgcheck,
        );
        tools::run_tool(self.executor.as_ref(), &cmd)
            .await
            .map_err(failed)?;

        info!("repository mirror refreshed");
        Ok(())
    }

    /// Remove everything the mirror of `repository` left behind
    ///
    /// Files that are already gone are fine.
    ///
    /// # Errors
    /// Returns `CoreError::RepositoryCleanupFailed` for any other failure
    #[instrument(skip(self, _guard, repository), fields(repository = %repository.name))]
    pub async fn cleanup_pool_mirror(
        &self,
        _guard: &SyncGuard,
        repository: &Repository,
    ) -> Result<(), CoreError> {
        let failed = |reason: String| CoreError::RepositoryCleanupFailed {
            repository: repository.name.clone(),
            reason,
        };

        // The package manager only knows the repository while its config exists
        if config_path(&self.repos_dir, &repository.name).exists() {
            self.package_manager
                .clean_metadata(&repository.name)
                .await
                .map_err(|e| failed(e.to_string()))?;
        }

        remove_config(&self.repos_dir, &repository.name).map_err(|e| failed(e.to_string()))?;

        let dir = self.store.repo_dir(&repository.name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(path = %dir.display(), "removed mirror"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(failed(format!("{}: {e}", dir.display()))),
        }

        info!("repository mirror cleaned up");
        Ok(())
    }

    /// Rebuild the mirror of `repository` into a repository hosts can use,
    /// carrying the synced update-info document with its checksum intact
    ///
    /// # Errors
    /// Returns `CoreError::InvalidMetadata` if the mirrored index or its
    /// update-info document is missing or malformed, and
    /// `CoreError::MetadataRebuildFailed` if staging or a metadata tool fails
    #[instrument(skip(self, _guard, repository), fields(repository = %repository.name))]
    pub async fn create_local_repository(
        &self,
        _guard: &SyncGuard,
        repository: &Repository,
    ) -> Result<UpdateInfoMetadata, CoreError> {
        let name = &repository.name;
        let metadata = self.store.load_index(name)?;

        let file_name = Path::new(&metadata.location)
            .file_name()
            .and_then(|f| f.to_str());
        if file_name != Some(metadata.expected_file_name().as_str()) {
            return Err(CoreError::InvalidMetadata(format!(
                "update-info location {} does not match checksum {}",
                metadata.location, metadata.checksum
            )));
        }

        let repo_dir = self.store.repo_dir(name);
        let document = repo_dir.join(&metadata.location);
        if !document.is_file() {
            return Err(CoreError::InvalidMetadata(format!(
                "update-info document {} does not exist",
                document.display()
            )));
        }

        let rebuild_failed = |reason: String| CoreError::MetadataRebuildFailed {
            repository: name.clone(),
            reason,
        };

        let staged = self.store.update_info_path(name, &metadata.checksum);
        tokio::fs::copy(&document, &staged)
            .await
            .map_err(|e| rebuild_failed(format!("staging {}: {e}", staged.display())))?;

        let repodata = repo_dir.join("repodata");
        for cmd in [
            tools::createrepo(&repo_dir),
            tools::modifyrepo_remove_update_info(&repodata),
            tools::modifyrepo_add_update_info(&staged, &repodata),
        ] {
            tools::run_tool(self.executor.as_ref(), &cmd)
                .await
                .map_err(|e| rebuild_failed(e.to_string()))?;
        }

        info!(checksum = %metadata.checksum, "local repository rebuilt");
        Ok(metadata)
    }
}
