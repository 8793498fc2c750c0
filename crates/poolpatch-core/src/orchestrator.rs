//! `UpdateOrchestrator`: pool-wide sync, consolidation, and application
//!
//! Long-running pool operations live here rather than in the pool actor so
//! that a second sync fails on the sync lock immediately instead of queueing
//! behind the first in a mailbox. Records are read from and written to the
//! `PoolActor`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use kameo::actor::ActorRef;
use poolpatch_api::Guidance;
use poolpatch_api::events::PoolEvent;
use poolpatch_api::responses::SyncResponse;
use poolpatch_api::updates::{
    HostUpdateSummary, HostUpdatesResponse, PoolUpdatesResponse, UpdateDetail,
};
use poolpatch_api::vm::PowerState;
use poolpatch_repo::{UpdateInfo, UpdateInfoIndex, validate_checksum};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::actor::pool::PoolActor;
use crate::config::HostConfig;
use crate::error::{CoreError, from_send_error};
use crate::fanout::{HostOutcome, PoolFanout, all_succeeded};
use crate::guidance::{
    GuidanceKind, GuidanceSet, RemediationStep, assert_valid, evaluate, remediation_plan,
};
use crate::host::{HostConnector, HostSession, SessionError, SessionGuard};
use crate::locks::{RepositoryLocks, SyncGuard};
use crate::message::{
    GetEnabledRepository, GetHost, GetRepository, ListHosts, RecordSyncResult,
    SetEnabledRepository,
};
use crate::query::query_remote;
use crate::state::{Repository, SyncRecord};
use crate::sync::RepositorySync;

/// Arguments for building an `UpdateOrchestrator`
pub struct UpdateOrchestratorArgs {
    /// Repository and host database
    pub pool: ActorRef<PoolActor>,
    /// Sync lock and pool-repository gate, shared with the HTTP layer
    pub locks: Arc<RepositoryLocks>,
    pub sync: RepositorySync,
    pub connector: Arc<dyn HostConnector>,
    pub fanout: PoolFanout,
    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

/// Drives sync, consolidation, and update application across the pool
pub struct UpdateOrchestrator {
    pool: ActorRef<PoolActor>,
    locks: Arc<RepositoryLocks>,
    sync: RepositorySync,
    connector: Arc<dyn HostConnector>,
    fanout: PoolFanout,
    event_tx: broadcast::Sender<PoolEvent>,
}

impl UpdateOrchestrator {
    #[must_use]
    pub fn new(args: UpdateOrchestratorArgs) -> Self {
        let (event_tx, _) = broadcast::channel(args.event_channel_capacity);
        Self {
            pool: args.pool,
            locks: args.locks,
            sync: args.sync,
            connector: args.connector,
            fanout: args.fanout,
            event_tx,
        }
    }

    /// Get a receiver for pool events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn pool(&self) -> &ActorRef<PoolActor> {
        &self.pool
    }

    #[must_use]
    pub fn locks(&self) -> &Arc<RepositoryLocks> {
        &self.locks
    }

    fn emit(&self, event: PoolEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    async fn enabled_repository(&self) -> Result<Repository, CoreError> {
        self.pool
            .ask(GetEnabledRepository)
            .await
            .map_err(from_send_error)
    }

    async fn list_hosts(&self) -> Result<Vec<HostConfig>, CoreError> {
        self.pool
            .ask(ListHosts)
            .await
            .map_err(|e| CoreError::ActorError(e.to_string()))
    }

    async fn get_host(&self, name: &str) -> Result<HostConfig, CoreError> {
        self.pool
            .ask(GetHost {
                name: name.to_string(),
            })
            .await
            .map_err(from_send_error)
    }

    /// `None` means every registered host
    async fn resolve_hosts(&self, names: Option<Vec<String>>) -> Result<Vec<HostConfig>, CoreError> {
        match names {
            None => self.list_hosts().await,
            Some(names) => {
                let mut hosts = Vec::with_capacity(names.len());
                for name in names {
                    hosts.push(self.get_host(&name).await?);
                }
                Ok(hosts)
            }
        }
    }

    /// Query every host in `hosts` through the fan-out
    async fn query_hosts(
        &self,
        hosts: Vec<HostConfig>,
        installed: bool,
    ) -> Vec<HostOutcome<HostUpdatesResponse>> {
        let names = hosts.iter().map(|h| h.name.clone()).collect();
        let by_name: HashMap<String, HostConfig> =
            hosts.into_iter().map(|h| (h.name.clone(), h)).collect();

        let outcomes = self
            .fanout
            .run_all(names, |name| {
                let connector = Arc::clone(&self.connector);
                let host = by_name.get(&name).cloned();
                async move {
                    match host {
                        Some(host) => query_remote(connector.as_ref(), &host, installed).await,
                        None => Err(CoreError::HostNotFound(name)),
                    }
                }
            })
            .await;

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                self.emit(PoolEvent::HostUnreachable {
                    host: outcome.host.clone(),
                    reason: e.to_string(),
                });
            }
        }
        outcomes
    }

    /// Mirror the enabled repository, rebuild it for the pool, and record
    /// whether any host needs an update from it
    ///
    /// # Errors
    /// Returns `CoreError::NoRepositoryEnabled`, `CoreError::SyncAlreadyInProgress`,
    /// or the failure of the sync, rebuild, or status step
    #[instrument(skip(self))]
    pub async fn sync_pool_repository(&self) -> Result<SyncResponse, CoreError> {
        // Hold the lock before reading, so enable_repository cannot switch
        // repositories under this sync
        let guard = self.locks.try_sync()?;
        let repository = self.enabled_repository().await?;

        info!(repository = %repository.name, "pool repository sync started");
        self.emit(PoolEvent::SyncStarted {
            repository: repository.name.clone(),
            at: Utc::now(),
        });

        self.sync.sync(&guard, &repository).await?;
        let metadata = self.sync.create_local_repository(&guard, &repository).await?;
        let up_to_date = self
            .compute_pool_update_status(&guard, &repository, &metadata.checksum)
            .await?;

        info!(
            repository = %repository.name,
            hash = %metadata.checksum,
            up_to_date,
            "pool repository sync finished"
        );
        self.emit(PoolEvent::SyncFinished {
            repository: repository.name.clone(),
            hash: metadata.checksum.clone(),
            up_to_date,
        });

        Ok(SyncResponse {
            hash: metadata.checksum,
            up_to_date,
        })
    }

    /// Ask every host whether it needs anything from the freshly rebuilt
    /// repository and record the answer with `checksum`
    ///
    /// # Errors
    /// Returns `CoreError::GetPoolUpdatesFailed` naming every host that
    /// could not be queried
    pub async fn compute_pool_update_status(
        &self,
        _guard: &SyncGuard,
        repository: &Repository,
        checksum: &str,
    ) -> Result<bool, CoreError> {
        let hosts = self.list_hosts().await?;

        let outcomes = {
            let _access = self.locks.pool_repository().await;
            self.query_hosts(hosts, false).await
        };
        let reports = all_succeeded(outcomes)?;

        let hosts_with_updates = reports.iter().filter(|(_, r)| r.available()).count();
        let up_to_date = hosts_with_updates == 0;

        self.pool
            .ask(RecordSyncResult {
                name: repository.name.clone(),
                record: SyncRecord {
                    hash: checksum.to_string(),
                    up_to_date,
                    at: Utc::now(),
                },
            })
            .await
            .map_err(from_send_error)?;

        self.emit(PoolEvent::PoolStatusComputed {
            repository: repository.name.clone(),
            hosts_with_updates,
        });
        Ok(up_to_date)
    }

    /// Check the recorded (or caller's) hash against the mirror and load
    /// the update-info index it names
    fn load_verified_index(
        &self,
        repository: &Repository,
        expected_hash: &str,
    ) -> Result<(String, UpdateInfoIndex), CoreError> {
        let store = self.sync.store();
        let metadata = store.load_index(&repository.name)?;
        validate_checksum(expected_hash, &metadata.checksum)?;
        let index = store.load_update_info(&repository.name, &metadata.checksum)?;
        Ok((metadata.checksum, index))
    }

    /// Everything the pool (or the named hosts) needs from the enabled
    /// repository, with per-host guidance
    ///
    /// # Errors
    /// Returns `CoreError::UpdatesRequireSync` if the mirror changed since
    /// the last sync and `CoreError::GetPoolUpdatesFailed` if any host
    /// could not be queried
    #[instrument(skip(self))]
    pub async fn consolidate_pool_updates(
        &self,
        hosts: Option<Vec<String>>,
    ) -> Result<PoolUpdatesResponse, CoreError> {
        let repository = self.enabled_repository().await?;
        let (hash, index) = self.load_verified_index(&repository, &repository.hash)?;
        let targets = self.resolve_hosts(hosts).await?;

        let outcomes = {
            let _access = self.locks.pool_repository().await;
            self.query_hosts(targets, true).await
        };
        let reports = all_succeeded(outcomes)?;

        let mut all_ids = BTreeSet::new();
        let summaries = reports
            .into_iter()
            .map(|(host, report)| {
                let update_ids: BTreeSet<String> =
                    report.updates.iter().map(|u| u.update_id.clone()).collect();
                all_ids.extend(update_ids.iter().cloned());

                let ids = || update_ids.iter().map(String::as_str);
                HostUpdateSummary {
                    host,
                    recommended_guidance: evaluate(&index, ids(), GuidanceKind::Recommended)
                        .into_iter()
                        .collect(),
                    absolute_guidance: evaluate(&index, ids(), GuidanceKind::Absolute)
                        .into_iter()
                        .collect(),
                    update_ids: update_ids.iter().cloned().collect(),
                    updates: report.updates,
                }
            })
            .collect();

        let updates = all_ids
            .iter()
            .filter_map(|id| index.get(id))
            .map(update_detail)
            .collect();

        Ok(PoolUpdatesResponse {
            hosts: summaries,
            updates,
            hash,
        })
    }

    /// Apply every available update to `host` and return the recommended
    /// guidance the host now needs
    ///
    /// # Errors
    /// Every failure is wrapped in `CoreError::ApplyUpdatesFailed`
    #[instrument(skip(self))]
    pub async fn apply_to_host(
        &self,
        host: &str,
        expected_hash: &str,
    ) -> Result<Vec<Guidance>, CoreError> {
        self.try_apply_to_host(host, expected_hash)
            .await
            .map_err(|e| CoreError::ApplyUpdatesFailed {
                host: host.to_string(),
                source: Box::new(e),
            })
    }

    async fn try_apply_to_host(
        &self,
        name: &str,
        expected_hash: &str,
    ) -> Result<Vec<Guidance>, CoreError> {
        let host = self.get_host(name).await?;
        let repository = self.enabled_repository().await?;
        let (_, index) = self.load_verified_index(&repository, expected_hash)?;

        let _access = self.locks.pool_repository().await;
        let guard = SessionGuard::open(self.connector.as_ref(), &host)
            .await
            .map_err(|e| CoreError::GetHostUpdatesFailed {
                host: host.name.clone(),
                reason: e.to_string(),
            })?;

        let result = apply_in_session(&host.name, guard.session(), &index).await;
        guard.end().await;
        result
    }

    /// Carry out `guidance` on `host` in remediation-table order
    ///
    /// # Errors
    /// Returns `CoreError::InvalidGuidanceCombination` for a set outside the
    /// table and `CoreError::ApplyGuidanceFailed` if the host cannot be
    /// remediated
    #[instrument(skip(self))]
    pub async fn execute_guidance(&self, host: &str, guidance: &[Guidance]) -> Result<(), CoreError> {
        let set: GuidanceSet = guidance.iter().copied().collect();
        let plan = remediation_plan(&set).ok_or_else(|| CoreError::InvalidGuidanceCombination {
            host: host.to_string(),
            guidance: set.iter().copied().collect(),
        })?;

        if plan.is_empty() {
            info!(host, "no remediation needed");
            return Ok(());
        }

        let config = self.get_host(host).await?;
        let pool_size = self.list_hosts().await?.len();

        let guard = SessionGuard::open(self.connector.as_ref(), &config)
            .await
            .map_err(|e| guidance_failed(host, &e))?;
        let result = run_plan(host, guard.session(), plan, pool_size).await;
        guard.end().await;

        if result.is_ok() {
            info!(host, ?set, "guidance executed");
        }
        result
    }

    /// Apply updates to `host`, then carry out the resulting guidance
    ///
    /// # Errors
    /// Returns the failure of either step
    pub async fn apply_updates(&self, host: &str, hash: &str) -> Result<Vec<Guidance>, CoreError> {
        let guidance = self.apply_to_host(host, hash).await?;
        self.emit(PoolEvent::UpdatesApplied {
            host: host.to_string(),
            guidance: guidance.clone(),
        });

        self.execute_guidance(host, &guidance).await?;
        self.emit(PoolEvent::GuidanceExecuted {
            host: host.to_string(),
            guidance: guidance.clone(),
        });

        Ok(guidance)
    }

    /// Enable `name` for the pool (or disable with `None`), cleaning up the
    /// mirror of the previously enabled repository when it changes
    ///
    /// # Errors
    /// Returns `CoreError::SyncAlreadyInProgress` while a sync runs,
    /// `CoreError::RepositoryNotFound` for an unknown name, and
    /// `CoreError::RepositoryCleanupFailed` if the old mirror cannot be removed
    #[instrument(skip(self))]
    pub async fn enable_repository(&self, name: Option<String>) -> Result<(), CoreError> {
        let guard = self.locks.try_sync()?;

        if let Some(name) = &name {
            self.pool
                .ask(GetRepository { name: name.clone() })
                .await
                .map_err(from_send_error)?;
        }

        let current = match self.enabled_repository().await {
            Ok(repository) => Some(repository),
            Err(CoreError::NoRepositoryEnabled) => None,
            Err(e) => return Err(e),
        };

        if let Some(previous) = &current
            && Some(&previous.name) != name.as_ref()
        {
            self.sync.cleanup_pool_mirror(&guard, previous).await?;
        }

        self.pool
            .ask(SetEnabledRepository { name })
            .await
            .map_err(from_send_error)?;
        Ok(())
    }
}

/// Query, evaluate, and apply within one session
async fn apply_in_session(
    host: &str,
    session: &dyn HostSession,
    index: &UpdateInfoIndex,
) -> Result<Vec<Guidance>, CoreError> {
    let report = session
        .updates(true)
        .await
        .map_err(|e| CoreError::GetHostUpdatesFailed {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

    if !report.available() {
        info!(host, "host has no updates to apply");
        return Ok(Vec::new());
    }

    let ids = report.updates.iter().map(|u| u.update_id.as_str());
    let guidance = evaluate(index, ids, GuidanceKind::Recommended);
    assert_valid(host, &guidance)?;

    session
        .apply_updates()
        .await
        .map_err(|e| CoreError::PackageError(e.to_string()))?;

    info!(host, count = report.updates.len(), ?guidance, "updates applied");
    Ok(guidance.into_iter().collect())
}

fn guidance_failed(host: &str, e: &SessionError) -> CoreError {
    CoreError::ApplyGuidanceFailed {
        host: host.to_string(),
        vms: Vec::new(),
        reason: e.to_string(),
    }
}

async fn run_plan(
    host: &str,
    session: &dyn HostSession,
    plan: &[RemediationStep],
    pool_size: usize,
) -> Result<(), CoreError> {
    for step in plan {
        match *step {
            RemediationStep::RebootHost => {
                info!(host, "rebooting host");
                session.reboot().await.map_err(|e| guidance_failed(host, &e))?;
            }
            RemediationStep::RestartToolstack => {
                info!(host, "restarting toolstack");
                session
                    .restart_toolstack()
                    .await
                    .map_err(|e| guidance_failed(host, &e))?;
            }
            RemediationStep::RestartDeviceModels { skip_if_evacuated } => {
                if skip_if_evacuated && pool_size != 1 {
                    info!(host, "host is evacuated, skipping device model restart");
                    continue;
                }
                restart_device_models(host, session).await?;
            }
        }
    }
    Ok(())
}

/// Live-migrate every running VM with a device model onto its own host.
/// Paused VMs cannot be migrated and fail the step once the rest are done.
async fn restart_device_models(host: &str, session: &dyn HostSession) -> Result<(), CoreError> {
    let vms = session
        .resident_vms()
        .await
        .map_err(|e| guidance_failed(host, &e))?;

    let mut unrecoverable = Vec::new();
    for vm in vms
        .iter()
        .filter(|vm| !vm.is_control_domain && vm.has_device_model)
    {
        match vm.power_state {
            PowerState::Running => {
                info!(host, vm = %vm.uuid, name = %vm.name_label, "restarting device model");
                session
                    .migrate_local(&vm.uuid)
                    .await
                    .map_err(|e| guidance_failed(host, &e))?;
            }
            PowerState::Paused => {
                warn!(host, vm = %vm.uuid, name = %vm.name_label, "paused VM cannot restart its device model");
                unrecoverable.push(vm.uuid.clone());
            }
            PowerState::Halted | PowerState::Suspended => {}
        }
    }

    if unrecoverable.is_empty() {
        Ok(())
    } else {
        Err(CoreError::ApplyGuidanceFailed {
            host: host.to_string(),
            reason: format!(
                "{} paused VM(s) could not restart their device model",
                unrecoverable.len()
            ),
            vms: unrecoverable,
        })
    }
}

fn update_detail(info: &UpdateInfo) -> UpdateDetail {
    UpdateDetail {
        id: info.id.clone(),
        summary: info.summary.clone(),
        description: info.description.clone(),
        update_type: info.update_type.clone(),
        severity: info.severity.clone(),
        recommended_guidance: info.recommended_guidance.clone(),
        absolute_guidance: info.absolute_guidance.clone(),
    }
}
