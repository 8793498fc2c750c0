//! Pool event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::guidance::Guidance;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum PoolEvent {
    SyncStarted {
        repository: String,
        at: DateTime<Utc>,
    },
    SyncFinished {
        repository: String,
        hash: String,
        up_to_date: bool,
    },
    PoolStatusComputed {
        repository: String,
        hosts_with_updates: usize,
    },
    UpdatesApplied {
        host: String,
        guidance: Vec<Guidance>,
    },
    GuidanceExecuted {
        host: String,
        guidance: Vec<Guidance>,
    },
    HostUnreachable {
        host: String,
        reason: String,
    },
}
