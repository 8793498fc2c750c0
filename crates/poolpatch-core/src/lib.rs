//! poolpatch-core: pool update orchestration
//!
//! Implements the `PoolActor` repository and host database on kameo, the
//! repository sync and rebuild steps, guidance evaluation, the bounded host
//! fan-out, and the `UpdateOrchestrator` that ties them together.

pub mod actor;
pub mod config;
pub mod error;
pub mod fanout;
pub mod guidance;
pub mod host;
pub mod locks;
pub mod message;
pub mod orchestrator;
pub mod query;
pub mod state;
pub mod sync;

pub use actor::pool::{PoolActor, PoolActorArgs};
pub use config::{HostConfig, MirrorConfig, PoolConfig};
pub use error::CoreError;
pub use fanout::{DEFAULT_MAX_PARALLELISM, HostOutcome, PoolFanout};
pub use guidance::{GuidanceKind, GuidanceSet, RemediationStep};
pub use host::{HostConnector, HostSession, SessionError, SessionGuard};
pub use locks::{PoolRepositoryAccess, RepositoryLocks, SyncGuard};
pub use message::{
    ForgetRepository, GetEnabledRepository, GetHost, GetRepository, IntroduceRepository,
    ListHosts, ListRepositories, RecordSyncResult, RegisterHost, SetEnabledRepository,
    UnregisterHost,
};
pub use orchestrator::{UpdateOrchestrator, UpdateOrchestratorArgs};
pub use query::{LocalUpdateQuery, UpdateInfoSource, query_remote};
pub use state::{Repository, SyncRecord};
pub use sync::RepositorySync;
