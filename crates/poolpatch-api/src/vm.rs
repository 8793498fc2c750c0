//! VM records reported by host agents

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Running,
    Paused,
    Halted,
    Suspended,
}

/// A VM resident on a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VmRecord {
    pub uuid: String,
    pub name_label: String,
    pub power_state: PowerState,
    pub is_control_domain: bool,
    /// Whether an emulator process currently backs this VM
    pub has_device_model: bool,
}
