//! Update report types

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::guidance::Guidance;

/// One pending package update on a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HostUpdate {
    /// Package name
    pub name: String,
    /// Package architecture
    pub arch: String,
    /// Installed version (`[epoch:]version-release`), only for installed queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_version: Option<String>,
    /// Available version (`[epoch:]version-release`)
    pub new_version: String,
    /// Update-info identifier this package belongs to
    pub update_id: String,
    /// Repository the update comes from
    pub repository: String,
}

/// Per-host update report: `{"updates": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HostUpdatesResponse {
    pub updates: Vec<HostUpdate>,
}

impl HostUpdatesResponse {
    /// Whether the host has anything outstanding
    #[must_use]
    pub fn available(&self) -> bool {
        !self.updates.is_empty()
    }
}

/// One host's entry in the pool-wide report
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HostUpdateSummary {
    /// Host name
    pub host: String,
    /// Outstanding package updates
    pub updates: Vec<HostUpdate>,
    /// Distinct update identifiers, sorted
    pub update_ids: Vec<String>,
    /// Guidance to act on immediately after applying
    pub recommended_guidance: Vec<Guidance>,
    /// Guidance that will eventually be required (reported, not executed)
    pub absolute_guidance: Vec<Guidance>,
}

/// Details of one update from the update-info document
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateDetail {
    pub id: String,
    pub summary: String,
    pub description: String,
    /// `security`, `bugfix`, `enhancement`, ...
    pub update_type: String,
    pub severity: Option<String>,
    pub recommended_guidance: Vec<Guidance>,
    pub absolute_guidance: Vec<Guidance>,
}

/// Pool-wide update report: `{"hosts": [...], "updates": [...], "hash": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolUpdatesResponse {
    pub hosts: Vec<HostUpdateSummary>,
    pub updates: Vec<UpdateDetail>,
    /// Update-info checksum the report was computed against
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_report_shape() {
        let report = HostUpdatesResponse {
            updates: vec![HostUpdate {
                name: "xapi-core".to_string(),
                arch: "x86_64".to_string(),
                old_version: None,
                new_version: "1.249.3-1".to_string(),
                update_id: "XS-2024-0001".to_string(),
                repository: "local".to_string(),
            }],
        };

        let value = serde_json::to_value(&report).unwrap();
        assert!(value["updates"].is_array());
        assert!(value["updates"][0].get("old_version").is_none());
        assert_eq!(value["updates"][0]["update_id"], "XS-2024-0001");
        assert!(report.available());
    }

    #[test]
    fn test_empty_report_deserializes() {
        let report: HostUpdatesResponse = serde_json::from_str(r#"{"updates":[]}"#).unwrap();
        assert!(!report.available());
    }
}
