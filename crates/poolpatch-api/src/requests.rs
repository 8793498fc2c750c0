//! Request types for the API

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub secret: String,
}

/// Query string for `GET /updates`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatesQuery {
    #[serde(default)]
    pub installed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IntroduceRepositoryRequest {
    pub name: String,
    #[serde(default)]
    pub name_description: String,
    pub binary_url: String,
    #[serde(default)]
    pub source_url: String,
}

/// Body for `PUT /pool/repository`; `null` disables pool updates
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnableRepositoryRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterHostRequest {
    pub name: String,
    /// Base URL of the host's agent
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplyUpdatesRequest {
    /// Update-info checksum from the pool report the caller acted on
    pub hash: String,
}

/// Query string for `GET /pool/updates`
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PoolUpdatesQuery {
    /// Comma-separated host names; every registered host when absent
    #[serde(default)]
    pub hosts: Option<String>,
}

impl PoolUpdatesQuery {
    /// The requested host names, or `None` for the whole pool
    #[must_use]
    pub fn host_names(&self) -> Option<Vec<String>> {
        self.hosts.as_ref().map(|hosts| {
            hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_updates_query_hosts() {
        assert_eq!(PoolUpdatesQuery::default().host_names(), None);

        let query = PoolUpdatesQuery {
            hosts: Some("host-1, host-2,,".to_string()),
        };
        assert_eq!(
            query.host_names(),
            Some(vec!["host-1".to_string(), "host-2".to_string()])
        );
    }
}
