//! Configuration loading and types

use std::path::{Path, PathBuf};

use poolpatch_core::{HostConfig, MirrorConfig, PoolConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the poolpatch daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon server settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Mirror and package manager settings
    #[serde(default)]
    pub mirror: MirrorConfig,
    /// Pool-wide operation settings
    #[serde(default)]
    pub pool: PoolConfig,
    /// Host control commands
    #[serde(default)]
    pub control: ControlConfig,
    /// Pool members registered on startup
    #[serde(default)]
    pub host: Vec<HostConfig>,
}

/// Daemon server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address and port to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Name this host reports itself as in logs and errors
    #[serde(default = "default_host_name")]
    pub host_name: String,
    /// Shared secret accepted by `POST /session`
    #[serde(default)]
    pub session_secret: String,
    /// Seconds a session may sit unused before it is dropped
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            host_name: default_host_name(),
            session_secret: String::new(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host_name() -> String {
    "localhost".to_string()
}

fn default_session_idle_secs() -> u64 {
    900
}

/// Commands the host agent runs to act on its own host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub reboot_command: String,
    pub toolstack_restart_command: String,
    /// Path of the `xe` CLI
    pub xe_path: String,
    /// UUID of this host as the hypervisor knows it
    pub host_uuid: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            reboot_command: "reboot".to_string(),
            toolstack_restart_command: "xe-toolstack-restart".to_string(),
            xe_path: "xe".to_string(),
            host_uuid: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find the config file: `$POOLPATCH_CONFIG`, then `./poolpatch.toml`,
    /// `/etc/poolpatch/poolpatch.toml` and the user config directory
    #[must_use]
    pub fn find() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("POOLPATCH_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let mut paths = vec![
            PathBuf::from("poolpatch.toml"),
            PathBuf::from("/etc/poolpatch/poolpatch.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("poolpatch/poolpatch.toml"));
        }
        paths.into_iter().find(|path| path.exists())
    }
}
