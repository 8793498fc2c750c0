//! Core error types for poolpatch-core

use poolpatch_api::Guidance;
use poolpatch_repo::RepoError;
use thiserror::Error;

/// Errors that can occur in pool update operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// A repository with the same name or binary URL is already known
    #[error("repository already exists: {0}")]
    RepositoryAlreadyExists(String),

    /// The repository is enabled for the pool and cannot be forgotten
    #[error("repository is in use by the pool: {0}")]
    RepositoryInUse(String),

    /// Repository not found in the database
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// Another sync currently holds the sync lock
    #[error("a repository sync is already in progress")]
    SyncAlreadyInProgress,

    /// The pool has no enabled repository
    #[error("no repository is enabled for the pool")]
    NoRepositoryEnabled,

    /// Mirror cleanup failed
    #[error("failed to clean up repository {repository}: {reason}")]
    RepositoryCleanupFailed {
        /// Repository being cleaned up
        repository: String,
        /// Underlying failure
        reason: String,
    },

    /// Mirroring tool failed
    #[error("failed to sync repository {repository}: {reason}")]
    SyncFailed {
        /// Repository being synced
        repository: String,
        /// Underlying failure
        reason: String,
    },

    /// Metadata index missing or malformed
    #[error("invalid repository metadata: {0}")]
    InvalidMetadata(String),

    /// Update-info document missing or malformed
    #[error("invalid update-info document: {0}")]
    InvalidUpdateInfoDocument(String),

    /// Rebuilding the local repository metadata failed
    #[error("failed to rebuild metadata for {repository}: {reason}")]
    MetadataRebuildFailed {
        /// Repository being rebuilt
        repository: String,
        /// Underlying failure
        reason: String,
    },

    /// The recorded hash no longer matches the mirror; sync again first
    #[error("updates require a sync: expected hash {expected}, mirror has {actual}")]
    UpdatesRequireSync {
        /// Hash the caller (or the database) expected
        expected: String,
        /// Hash found on disk
        actual: String,
    },

    /// Querying a single host for updates failed
    #[error("failed to get updates from host {host}: {reason}")]
    GetHostUpdatesFailed {
        /// Host queried
        host: String,
        /// Underlying failure
        reason: String,
    },

    /// One or more hosts failed during a pool-wide query
    #[error("failed to get updates from hosts: {}", hosts.join(", "))]
    GetPoolUpdatesFailed {
        /// Hosts whose query failed
        hosts: Vec<String>,
    },

    /// Applying updates to a host failed
    #[error("failed to apply updates on host {host}: {source}")]
    ApplyUpdatesFailed {
        /// Host being updated
        host: String,
        /// What went wrong
        source: Box<CoreError>,
    },

    /// The guidance set is not one of the legal combinations
    #[error("invalid guidance combination for host {host}: {guidance:?}")]
    InvalidGuidanceCombination {
        /// Host the guidance was computed for
        host: String,
        /// Offending set
        guidance: Vec<Guidance>,
    },

    /// Executing guidance on a host failed
    #[error("failed to apply guidance on host {host}: {reason}")]
    ApplyGuidanceFailed {
        /// Host being remediated
        host: String,
        /// VMs that could not be remediated
        vms: Vec<String>,
        /// Underlying failure
        reason: String,
    },

    /// The host's package manager failed
    #[error("package manager error: {0}")]
    PackageError(String),

    /// Host not found in registry
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// Host already exists in registry
    #[error("host already exists: {0}")]
    HostAlreadyExists(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl CoreError {
    /// Stable machine-readable code for API responses
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::RepositoryAlreadyExists(_) => "REPOSITORY_ALREADY_EXISTS",
            CoreError::RepositoryInUse(_) => "REPOSITORY_IN_USE",
            CoreError::RepositoryNotFound(_) => "REPOSITORY_NOT_FOUND",
            CoreError::SyncAlreadyInProgress => "SYNC_ALREADY_IN_PROGRESS",
            CoreError::NoRepositoryEnabled => "NO_REPOSITORY_ENABLED",
            CoreError::RepositoryCleanupFailed { .. } => "REPOSITORY_CLEANUP_FAILED",
            CoreError::SyncFailed { .. } => "SYNC_FAILED",
            CoreError::InvalidMetadata(_) => "INVALID_METADATA",
            CoreError::InvalidUpdateInfoDocument(_) => "INVALID_UPDATEINFO_DOCUMENT",
            CoreError::MetadataRebuildFailed { .. } => "METADATA_REBUILD_FAILED",
            CoreError::UpdatesRequireSync { .. } => "UPDATES_REQUIRE_SYNC",
            CoreError::GetHostUpdatesFailed { .. } => "GET_HOST_UPDATES_FAILED",
            CoreError::GetPoolUpdatesFailed { .. } => "GET_POOL_UPDATES_FAILED",
            CoreError::ApplyUpdatesFailed { .. } => "APPLY_UPDATES_FAILED",
            CoreError::InvalidGuidanceCombination { .. } => "INVALID_GUIDANCE_COMBINATION",
            CoreError::ApplyGuidanceFailed { .. } => "APPLY_GUIDANCE_FAILED",
            CoreError::PackageError(_) => "PACKAGE_ERROR",
            CoreError::HostNotFound(_) => "HOST_NOT_FOUND",
            CoreError::HostAlreadyExists(_) => "HOST_ALREADY_EXISTS",
            CoreError::ActorError(_) => "ACTOR_ERROR",
        }
    }
}

/// Metadata-level repository errors. Tool failures are mapped where the
/// tool is run, since the right variant depends on the operation.
impl From<RepoError> for CoreError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::ChecksumMismatch { expected, actual } => {
                CoreError::UpdatesRequireSync { expected, actual }
            }
            RepoError::InvalidUpdateInfo(reason) => CoreError::InvalidUpdateInfoDocument(reason),
            RepoError::InvalidMetadata(reason) => CoreError::InvalidMetadata(reason),
            other => CoreError::InvalidMetadata(other.to_string()),
        }
    }
}

/// Turn a kameo `ask` failure into a `CoreError`, keeping handler errors as-is
pub fn from_send_error<M>(err: kameo::error::SendError<M, CoreError>) -> CoreError {
    match err {
        kameo::error::SendError::HandlerError(e) => e,
        other => CoreError::ActorError(other.to_string()),
    }
}
