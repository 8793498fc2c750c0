//! Type definitions for repository metadata and packages

use std::collections::HashMap;
use std::fmt;

use poolpatch_api::Guidance;
use serde::{Deserialize, Serialize};

/// Location and checksum of the update-info document named by `repomd.xml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfoMetadata {
    /// Content checksum of the compressed update-info document
    pub checksum: String,
    /// Path relative to the repository root, e.g. `repodata/<checksum>-updateinfo.xml.gz`
    pub location: String,
}

impl UpdateInfoMetadata {
    /// File name the document must carry for this checksum
    #[must_use]
    pub fn expected_file_name(&self) -> String {
        update_info_file_name(&self.checksum)
    }
}

/// `<checksum>-updateinfo.xml.gz`
#[must_use]
pub fn update_info_file_name(checksum: &str) -> String {
    format!("{checksum}-updateinfo.xml.gz")
}

/// A package named in an update's package list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    pub arch: String,
    pub epoch: Option<String>,
    pub version: String,
    pub release: String,
}

impl PackageRef {
    /// Whether `pkg` is exactly this package build (epoch is ignored when
    /// either side omits it)
    #[must_use]
    pub fn matches(&self, pkg: &UpgradablePackage) -> bool {
        let epoch_matches = match (&self.epoch, &pkg.version.epoch) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        self.name == pkg.name
            && self.arch == pkg.arch
            && self.version == pkg.version.version
            && self.release == pkg.version.release
            && epoch_matches
    }
}

/// One entry of the update-info document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub id: String,
    pub summary: String,
    pub description: String,
    /// `type` attribute: security, bugfix, enhancement
    pub update_type: String,
    pub severity: Option<String>,
    /// Guidance to act on right after applying
    pub recommended_guidance: Vec<Guidance>,
    /// Guidance required eventually
    pub absolute_guidance: Vec<Guidance>,
    pub packages: Vec<PackageRef>,
}

/// Update-info entries keyed by update id
pub type UpdateInfoIndex = HashMap<String, UpdateInfo>;

/// `[epoch:]version-release`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub epoch: Option<String>,
    pub version: String,
    pub release: String,
}

impl PackageVersion {
    /// Parse an EVR string as printed by the package manager
    #[must_use]
    pub fn parse(evr: &str) -> Option<Self> {
        let (epoch, rest) = match evr.split_once(':') {
            Some((e, rest)) => (Some(e.to_string()), rest),
            None => (None, evr),
        };
        let (version, release) = rest.rsplit_once('-')?;
        if version.is_empty() || release.is_empty() {
            return None;
        }
        Some(Self {
            epoch,
            version: version.to_string(),
            release: release.to_string(),
        })
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.epoch {
            Some(epoch) => write!(f, "{epoch}:{}-{}", self.version, self.release),
            None => write!(f, "{}-{}", self.version, self.release),
        }
    }
}

/// A package line from the package manager (available or installed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradablePackage {
    /// Package name
    pub name: String,
    /// Package architecture
    pub arch: String,
    /// Version offered (or installed, for installed listings)
    pub version: PackageVersion,
    /// Repository column
    pub repository: String,
}

impl UpgradablePackage {
    /// `name.arch`
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.arch)
    }
}

/// Result of an upgrade run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeResult {
    /// Whether the package manager reported completion
    pub success: bool,
    /// Number of packages upgraded
    pub upgraded_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_with_epoch() {
        let v = PackageVersion::parse("2:8.2.2637-20.el9_1").unwrap();
        assert_eq!(v.epoch.as_deref(), Some("2"));
        assert_eq!(v.version, "8.2.2637");
        assert_eq!(v.release, "20.el9_1");
        assert_eq!(v.to_string(), "2:8.2.2637-20.el9_1");
    }

    #[test]
    fn test_parse_version_without_release_fails() {
        assert!(PackageVersion::parse("1.0").is_none());
        assert!(PackageVersion::parse("-1").is_none());
    }

    #[test]
    fn test_package_ref_ignores_missing_epoch() {
        let pkg = UpgradablePackage {
            name: "xapi-core".to_string(),
            arch: "x86_64".to_string(),
            version: PackageVersion::parse("0:1.2-3").unwrap(),
            repository: "local".to_string(),
        };
        let mut reference = PackageRef {
            name: "xapi-core".to_string(),
            arch: "x86_64".to_string(),
            epoch: None,
            version: "1.2".to_string(),
            release: "3".to_string(),
        };
        assert!(reference.matches(&pkg));

        reference.epoch = Some("1".to_string());
        assert!(!reference.matches(&pkg));
    }
}
