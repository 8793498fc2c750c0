//! Message types for the pool database actor
//!
//! Handlers are implemented in `actor::pool`.

use crate::config::HostConfig;
use crate::state::{Repository, SyncRecord};

// ============================================================================
// Repository messages
// ============================================================================

/// Add a repository; name and binary URL must both be unused
#[derive(Debug)]
pub struct IntroduceRepository {
    pub repository: Repository,
}

/// Remove a repository that is not enabled for the pool
#[derive(Debug)]
pub struct ForgetRepository {
    pub name: String,
}

/// All repositories with their enabled flag, ordered by name
#[derive(Debug)]
pub struct ListRepositories;

#[derive(Debug)]
pub struct GetRepository {
    pub name: String,
}

/// Set (or clear, with `None`) the pool's enabled repository.
/// Replies with the previously enabled repository.
#[derive(Debug)]
pub struct SetEnabledRepository {
    pub name: Option<String>,
}

/// The pool's enabled repository
#[derive(Debug)]
pub struct GetEnabledRepository;

/// Store the outcome of a sync against a repository
#[derive(Debug)]
pub struct RecordSyncResult {
    pub name: String,
    pub record: SyncRecord,
}

// ============================================================================
// Host messages
// ============================================================================

/// Add a pool member
#[derive(Debug)]
pub struct RegisterHost {
    pub config: HostConfig,
}

/// Remove a pool member
#[derive(Debug)]
pub struct UnregisterHost {
    pub name: String,
}

/// All pool members, ordered by name
#[derive(Debug)]
pub struct ListHosts;

#[derive(Debug)]
pub struct GetHost {
    pub name: String,
}
