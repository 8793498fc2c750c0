//! Process-wide coordination state for the pool repository
//!
//! Two pieces: a sync lock that is only ever try-locked, so a second sync
//! fails immediately instead of queueing, and a pool-repository access gate
//! that hosts can observe (the `/repository` endpoint is served only while
//! it is open).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::debug;

use crate::error::CoreError;

/// Shared lock and gate for the pool repository
#[derive(Debug, Default)]
pub struct RepositoryLocks {
    sync: Arc<Mutex<()>>,
    access: Mutex<()>,
    enabled: AtomicBool,
}

/// Proof that the holder owns the sync lock
#[derive(Debug)]
pub struct SyncGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Open pool-repository access; closes the gate when dropped
#[derive(Debug)]
pub struct PoolRepositoryAccess<'a> {
    _guard: MutexGuard<'a, ()>,
    enabled: &'a AtomicBool,
}

impl RepositoryLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the sync lock without waiting
    ///
    /// # Errors
    /// Returns `CoreError::SyncAlreadyInProgress` if another holder exists
    pub fn try_sync(&self) -> Result<SyncGuard, CoreError> {
        Arc::clone(&self.sync)
            .try_lock_owned()
            .map(|guard| SyncGuard { _guard: guard })
            .map_err(|_| CoreError::SyncAlreadyInProgress)
    }

    /// Wait for exclusive pool-repository access and open the gate
    pub async fn pool_repository(&self) -> PoolRepositoryAccess<'_> {
        let guard = self.access.lock().await;
        self.enabled.store(true, Ordering::SeqCst);
        debug!("pool repository access enabled");
        PoolRepositoryAccess {
            _guard: guard,
            enabled: &self.enabled,
        }
    }

    /// Whether hosts may currently fetch from the pool repository
    #[must_use]
    pub fn pool_repository_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Drop for PoolRepositoryAccess<'_> {
    fn drop(&mut self) {
        self.enabled.store(false, Ordering::SeqCst);
        debug!("pool repository access disabled");
    }
}
