//! Records held by the pool database

use chrono::{DateTime, Utc};
use poolpatch_api::requests::IntroduceRepositoryRequest;
use poolpatch_api::responses::RepositoryResponse;

/// A known upstream repository and the result of its last sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Unique name, also the mirror directory and repository id
    pub name: String,
    pub name_description: String,
    /// Unique upstream URL packages are mirrored from
    pub binary_url: String,
    pub source_url: String,
    /// Checksum of the update-info document at the last sync
    pub hash: String,
    /// No host needed an update at the last sync
    pub up_to_date: bool,
    pub last_synced: Option<DateTime<Utc>>,
}

impl Repository {
    /// A freshly introduced, never synced repository
    pub fn new(
        name: impl Into<String>,
        name_description: impl Into<String>,
        binary_url: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            name_description: name_description.into(),
            binary_url: binary_url.into(),
            source_url: source_url.into(),
            hash: String::new(),
            up_to_date: false,
            last_synced: None,
        }
    }

    #[must_use]
    pub fn to_response(&self, enabled: bool) -> RepositoryResponse {
        RepositoryResponse {
            name: self.name.clone(),
            name_description: self.name_description.clone(),
            binary_url: self.binary_url.clone(),
            source_url: self.source_url.clone(),
            hash: self.hash.clone(),
            up_to_date: self.up_to_date,
            enabled,
            last_synced: self.last_synced,
        }
    }
}

impl From<IntroduceRepositoryRequest> for Repository {
    fn from(req: IntroduceRepositoryRequest) -> Self {
        Repository::new(req.name, req.name_description, req.binary_url, req.source_url)
    }
}

/// Outcome of a sync, recorded against the repository
#[derive(Debug, Clone)]
pub struct SyncRecord {
    pub hash: String,
    pub up_to_date: bool,
    pub at: DateTime<Utc>,
}
