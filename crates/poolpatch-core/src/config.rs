//! Configuration types for hosts, the mirror, and pool operations

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fanout::DEFAULT_MAX_PARALLELISM;

/// A pool member reachable through its host agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Unique host name
    pub name: String,
    /// Base URL of the host agent, e.g. `http://host-1:8080`
    pub url: String,
}

/// Where repositories are mirrored and how the package manager sees them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Root directory holding one mirror per repository
    pub mirror_root: PathBuf,
    /// Package manager repository configuration directory
    pub repos_dir: PathBuf,
    /// Check package signatures while mirroring
    pub gpgcheck: bool,
    /// Repository id hosts use for the coordinator's local repository
    pub local_repo_id: String,
    /// Coordinator base URL, as seen from the hosts
    pub coordinator_url: String,
    /// `yum` or `dnf`
    pub package_tool: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            mirror_root: PathBuf::from("/var/lib/poolpatch/mirror"),
            repos_dir: PathBuf::from("/etc/yum.repos.d"),
            gpgcheck: true,
            local_repo_id: "poolpatch-local".to_string(),
            coordinator_url: "http://localhost:8080".to_string(),
            package_tool: "yum".to_string(),
        }
    }
}

impl MirrorConfig {
    /// Base URL hosts fetch the enabled mirror from
    #[must_use]
    pub fn local_repository_url(&self) -> String {
        format!("{}/repository/", self.coordinator_url.trim_end_matches('/'))
    }
}

/// Pool-wide operation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of hosts contacted at once
    pub parallelism: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_MAX_PARALLELISM,
        }
    }
}
