//! Plugin descriptors and runtime status

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Runtime status of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl PluginStatus {
    /// Transitional states must never be terminal; every code path out
    /// of start/stop has to land somewhere stable.
    pub fn is_transitional(&self) -> bool {
        matches!(self, PluginStatus::Starting | PluginStatus::Stopping)
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginStatus::Stopped => "stopped",
            PluginStatus::Starting => "starting",
            PluginStatus::Running => "running",
            PluginStatus::Stopping => "stopping",
            PluginStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PluginStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stopped" => Ok(PluginStatus::Stopped),
            "starting" => Ok(PluginStatus::Starting),
            "running" => Ok(PluginStatus::Running),
            "stopping" => Ok(PluginStatus::Stopping),
            "error" => Ok(PluginStatus::Error),
            other => Err(format!("unknown plugin status: {other}")),
        }
    }
}

/// One discovered plugin bundle.
///
/// Created by a registry scan; the status field is the only part mutated
/// afterwards, driven by supervisor transition events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub author: String,
    pub icon: String,
    pub entry_point: String,
    pub path: PathBuf,
    pub status: PluginStatus,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            PluginStatus::Stopped,
            PluginStatus::Starting,
            PluginStatus::Running,
            PluginStatus::Stopping,
            PluginStatus::Error,
        ] {
            assert_eq!(status.to_string().parse::<PluginStatus>(), Ok(status));
        }
    }

    #[test]
    fn transitional_states() {
        assert!(PluginStatus::Starting.is_transitional());
        assert!(PluginStatus::Stopping.is_transitional());
        assert!(!PluginStatus::Running.is_transitional());
        assert!(!PluginStatus::Error.is_transitional());
    }
}
