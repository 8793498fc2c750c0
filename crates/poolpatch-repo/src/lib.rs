//! poolpatch-repo: repository mirroring, metadata and package manager access
//!
//! Covers the coordinator's mirror (reposync, createrepo_c, modifyrepo_c),
//! parsing of `repomd.xml` and update-info documents, repository configuration
//! files, and the hosts' yum/dnf package manager.

pub mod config;
pub mod error;
pub mod metadata;
pub mod tools;
pub mod traits;
pub mod types;
pub mod yum;

pub use config::{RepoConfig, ScopedRepoConfig};
pub use error::RepoError;
pub use metadata::{MetadataStore, validate_checksum};
pub use traits::PackageManager;
pub use types::{
    PackageRef, PackageVersion, UpdateInfo, UpdateInfoIndex, UpdateInfoMetadata,
    UpgradablePackage, UpgradeResult,
};
pub use yum::YumManager;
