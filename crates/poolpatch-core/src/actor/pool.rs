//! `PoolActor`: the pool's repository and host database
//!
//! Owns the in-memory records and enforces their invariants: repository
//! names and binary URLs are unique, at most one repository is enabled, and
//! an enabled repository cannot be forgotten.

use std::collections::BTreeMap;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use poolpatch_api::responses::RepositoryResponse;
use tracing::info;

use crate::config::HostConfig;
use crate::error::CoreError;
use crate::message::{
    ForgetRepository, GetEnabledRepository, GetHost, GetRepository, IntroduceRepository,
    ListHosts, ListRepositories, RecordSyncResult, RegisterHost, SetEnabledRepository,
    UnregisterHost,
};
use crate::state::Repository;

/// Arguments for spawning a `PoolActor`
#[derive(Debug, Default)]
pub struct PoolActorArgs {
    /// Hosts registered on start
    pub hosts: Vec<HostConfig>,
}

/// In-memory repository and host records
pub struct PoolActor {
    repositories: BTreeMap<String, Repository>,
    hosts: BTreeMap<String, HostConfig>,
    enabled: Option<String>,
}

impl PoolActor {
    fn repository(&self, name: &str) -> Result<&Repository, CoreError> {
        self.repositories
            .get(name)
            .ok_or_else(|| CoreError::RepositoryNotFound(name.to_string()))
    }

    fn add_host(&mut self, config: HostConfig) -> Result<(), CoreError> {
        if self.hosts.contains_key(&config.name) {
            return Err(CoreError::HostAlreadyExists(config.name));
        }
        info!(host = %config.name, url = %config.url, "registered host");
        self.hosts.insert(config.name.clone(), config);
        Ok(())
    }
}

impl Actor for PoolActor {
    type Args = PoolActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), "PoolActor starting");

        let mut actor = Self {
            repositories: BTreeMap::new(),
            hosts: BTreeMap::new(),
            enabled: None,
        };
        for config in args.hosts {
            actor.add_host(config)?;
        }
        Ok(actor)
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "PoolActor stopping");
        Ok(())
    }
}

// ============================================================================
// Repository handlers
// ============================================================================

impl Message<IntroduceRepository> for PoolActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: IntroduceRepository,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let repository = msg.repository;

        if self.repositories.contains_key(&repository.name) {
            return Err(CoreError::RepositoryAlreadyExists(repository.name));
        }
        if let Some(existing) = self
            .repositories
            .values()
            .find(|r| r.binary_url == repository.binary_url)
        {
            return Err(CoreError::RepositoryAlreadyExists(existing.name.clone()));
        }

        info!(repository = %repository.name, url = %repository.binary_url, "introduced repository");
        self.repositories.insert(repository.name.clone(), repository);
        Ok(())
    }
}

impl Message<ForgetRepository> for PoolActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: ForgetRepository,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.enabled.as_deref() == Some(msg.name.as_str()) {
            return Err(CoreError::RepositoryInUse(msg.name));
        }
        if self.repositories.remove(&msg.name).is_none() {
            return Err(CoreError::RepositoryNotFound(msg.name));
        }

        info!(repository = %msg.name, "forgot repository");
        Ok(())
    }
}

impl Message<ListRepositories> for PoolActor {
    type Reply = Vec<RepositoryResponse>;

    async fn handle(
        &mut self,
        _msg: ListRepositories,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.repositories
            .values()
            .map(|r| r.to_response(self.enabled.as_deref() == Some(r.name.as_str())))
            .collect()
    }
}

impl Message<GetRepository> for PoolActor {
    type Reply = Result<Repository, CoreError>;

    async fn handle(
        &mut self,
        msg: GetRepository,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.repository(&msg.name).cloned()
    }
}

impl Message<SetEnabledRepository> for PoolActor {
    type Reply = Result<Option<Repository>, CoreError>;

    async fn handle(
        &mut self,
        msg: SetEnabledRepository,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if let Some(name) = &msg.name {
            self.repository(name)?;
        }

        let previous = self
            .enabled
            .take()
            .and_then(|name| self.repositories.get(&name).cloned());
        self.enabled = msg.name;

        info!(repository = ?self.enabled, "pool repository set");
        Ok(previous)
    }
}

impl Message<GetEnabledRepository> for PoolActor {
    type Reply = Result<Repository, CoreError>;

    async fn handle(
        &mut self,
        _msg: GetEnabledRepository,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let name = self.enabled.as_deref().ok_or(CoreError::NoRepositoryEnabled)?;
        self.repository(name).cloned()
    }
}

impl Message<RecordSyncResult> for PoolActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: RecordSyncResult,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let repository = self
            .repositories
            .get_mut(&msg.name)
            .ok_or_else(|| CoreError::RepositoryNotFound(msg.name.clone()))?;

        repository.hash = msg.record.hash;
        repository.up_to_date = msg.record.up_to_date;
        repository.last_synced = Some(msg.record.at);
        Ok(())
    }
}

// ============================================================================
// Host handlers
// ============================================================================

impl Message<RegisterHost> for PoolActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: RegisterHost,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.add_host(msg.config)
    }
}

impl Message<UnregisterHost> for PoolActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: UnregisterHost,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.hosts.remove(&msg.name).is_some() {
            info!(host = %msg.name, "unregistered host");
            Ok(())
        } else {
            Err(CoreError::HostNotFound(msg.name))
        }
    }
}

impl Message<ListHosts> for PoolActor {
    type Reply = Vec<HostConfig>;

    async fn handle(
        &mut self,
        _msg: ListHosts,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.hosts.values().cloned().collect()
    }
}

impl Message<GetHost> for PoolActor {
    type Reply = Result<HostConfig, CoreError>;

    async fn handle(
        &mut self,
        msg: GetHost,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.hosts
            .get(&msg.name)
            .cloned()
            .ok_or(CoreError::HostNotFound(msg.name))
    }
}

#[cfg(test)]
mod tests {
    use kameo::actor::Spawn;

    use super::*;

    fn repository(name: &str, url: &str) -> Repository {
        Repository::new(name, "", url, "")
    }

    #[tokio::test]
    async fn test_duplicate_binary_url_rejected() {
        let pool = PoolActor::spawn(PoolActorArgs::default());

        pool.ask(IntroduceRepository {
            repository: repository("base", "https://updates.example.com/base/"),
        })
        .await
        .unwrap();

        let result = pool
            .ask(IntroduceRepository {
                repository: repository("other", "https://updates.example.com/base/"),
            })
            .await;
        assert!(matches!(
            result,
            Err(kameo::error::SendError::HandlerError(CoreError::RepositoryAlreadyExists(_)))
        ));

        let result = pool
            .ask(IntroduceRepository {
                repository: repository("base", "https://elsewhere.example.com/"),
            })
            .await;
        assert!(matches!(
            result,
            Err(kameo::error::SendError::HandlerError(CoreError::RepositoryAlreadyExists(_)))
        ));
    }

    #[tokio::test]
    async fn test_enabled_repository_cannot_be_forgotten() {
        let pool = PoolActor::spawn(PoolActorArgs::default());
        pool.ask(IntroduceRepository {
            repository: repository("base", "http://a"),
        })
        .await
        .unwrap();
        pool.ask(SetEnabledRepository {
            name: Some("base".to_string()),
        })
        .await
        .unwrap();

        let result = pool
            .ask(ForgetRepository {
                name: "base".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(kameo::error::SendError::HandlerError(CoreError::RepositoryInUse(_)))
        ));

        let previous = pool.ask(SetEnabledRepository { name: None }).await.unwrap();
        assert_eq!(previous.map(|r| r.name).as_deref(), Some("base"));

        pool.ask(ForgetRepository {
            name: "base".to_string(),
        })
        .await
        .unwrap();
        assert!(pool.ask(ListRepositories).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enable_unknown_repository() {
        let pool = PoolActor::spawn(PoolActorArgs::default());

        let result = pool
            .ask(SetEnabledRepository {
                name: Some("missing".to_string()),
            })
            .await;
        assert!(matches!(
            result,
            Err(kameo::error::SendError::HandlerError(CoreError::RepositoryNotFound(_)))
        ));

        let result = pool.ask(GetEnabledRepository).await;
        assert!(matches!(
            result,
            Err(kameo::error::SendError::HandlerError(CoreError::NoRepositoryEnabled))
        ));
    }

    #[tokio::test]
    async fn test_record_sync_result() {
        let pool = PoolActor::spawn(PoolActorArgs::default());
        pool.ask(IntroduceRepository {
            repository: repository("base", "http://a"),
        })
        .await
        .unwrap();

        pool.ask(RecordSyncResult {
            name: "base".to_string(),
            record: crate::state::SyncRecord {
                hash: "c0ffee".to_string(),
                up_to_date: true,
                at: chrono::Utc::now(),
            },
        })
        .await
        .unwrap();

        let listed = pool.ask(ListRepositories).await.unwrap();
        assert_eq!(listed[0].hash, "c0ffee");
        assert!(listed[0].up_to_date);
        assert!(!listed[0].enabled);
        assert!(listed[0].last_synced.is_some());
    }

    #[tokio::test]
    async fn test_hosts_registered_on_start() {
        let pool = PoolActor::spawn(PoolActorArgs {
            hosts: vec![HostConfig {
                name: "host-1".to_string(),
                url: "http://host-1:8080".to_string(),
            }],
        });

        let result = pool
            .ask(RegisterHost {
                config: HostConfig {
                    name: "host-1".to_string(),
                    url: "http://other".to_string(),
                },
            })
            .await;
        assert!(matches!(
            result,
            Err(kameo::error::SendError::HandlerError(CoreError::HostAlreadyExists(_)))
        ));

        let host = pool
            .ask(GetHost {
                name: "host-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(host.url, "http://host-1:8080");

        pool.ask(UnregisterHost {
            name: "host-1".to_string(),
        })
        .await
        .unwrap();
        assert!(pool.ask(ListHosts).await.unwrap().is_empty());

        pool.stop_gracefully().await.unwrap();
    }
}
