//! Application state shared across HTTP handlers

use std::sync::Arc;
use std::time::Duration;

use kameo::actor::{ActorRef, Spawn};
use poolpatch_client::HttpClient;
use poolpatch_core::{
    LocalUpdateQuery, PoolActor, PoolActorArgs, PoolFanout, RepositoryLocks, RepositorySync,
    UpdateOrchestrator, UpdateOrchestratorArgs,
};
use poolpatch_exec::CommandExecutor;
use poolpatch_repo::YumManager;

use crate::config::Config;
use crate::control::HostControl;
use crate::factory::{HttpHostConnector, HttpUpdateInfoSource};
use crate::session::SessionStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Application state shared across all handlers
pub struct AppState {
    /// Repository and host database
    pub pool: ActorRef<PoolActor>,
    /// Coordinator-side pool operations
    pub orchestrator: UpdateOrchestrator,
    /// Host agent answers for this host
    pub updates: LocalUpdateQuery,
    /// Host agent actions on this host
    pub control: Arc<HostControl>,
    pub sessions: SessionStore,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Spawn the pool actor and wire both the coordinator and host agent
    /// sides around `executor`
    ///
    /// # Errors
    /// Returns error if the configured coordinator URL is invalid
    pub fn new(config: Config, executor: Arc<dyn CommandExecutor>) -> eyre::Result<Self> {
        let pool = PoolActor::spawn(PoolActorArgs {
            hosts: config.host.clone(),
        });

        let orchestrator = UpdateOrchestrator::new(UpdateOrchestratorArgs {
            pool: pool.clone(),
            locks: Arc::new(RepositoryLocks::new()),
            sync: RepositorySync::new(Arc::clone(&executor), &config.mirror),
            connector: Arc::new(HttpHostConnector::new(&config.daemon.session_secret)),
            fanout: PoolFanout::new(config.pool.parallelism),
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        });

        let coordinator = HttpClient::new(&config.mirror.coordinator_url)?;
        let updates = LocalUpdateQuery::new(
            &config.daemon.host_name,
            &config.mirror,
            Arc::new(YumManager::new(
                Arc::clone(&executor),
                &config.mirror.package_tool,
            )),
            Arc::new(HttpUpdateInfoSource::new(coordinator)),
        );

        Ok(Self {
            pool,
            orchestrator,
            updates,
            control: Arc::new(HostControl::new(executor, config.control.clone())),
            sessions: SessionStore::new(
                &config.daemon.session_secret,
                Duration::from_secs(config.daemon.session_idle_secs),
            ),
            config: Arc::new(config),
        })
    }

    /// Sync lock and pool-repository gate
    #[must_use]
    pub fn locks(&self) -> &Arc<RepositoryLocks> {
        self.orchestrator.locks()
    }
}
