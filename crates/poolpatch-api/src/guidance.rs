//! Remediation guidance names

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// A remediation action required after applying updates.
///
/// Ordering follows declaration order and is what canonical guidance sets
/// are sorted by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum Guidance {
    RebootHost,
    EvacuateHost,
    RestartDeviceModel,
    RestartToolstack,
}

impl Guidance {
    /// Every guidance, in canonical order
    pub const ALL: [Guidance; 4] = [
        Guidance::RebootHost,
        Guidance::EvacuateHost,
        Guidance::RestartDeviceModel,
        Guidance::RestartToolstack,
    ];

    /// Name as it appears in update-info documents and on the wire
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Guidance::RebootHost => "RebootHost",
            Guidance::EvacuateHost => "EvacuateHost",
            Guidance::RestartDeviceModel => "RestartDeviceModel",
            Guidance::RestartToolstack => "RestartToolstack",
        }
    }
}

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown guidance name
#[derive(Debug, Clone, Error)]
#[error("unknown guidance: {0}")]
pub struct ParseGuidanceError(pub String);

impl FromStr for Guidance {
    type Err = ParseGuidanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Guidance::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| ParseGuidanceError(s.to_string()))
    }
}
