//! Cluster Configuration
//!
//! Static topology plus timing knobs, loadable from TOML:
//!
//! ```toml
//! local_system_id = 2
//!
//! [[systems]]
//! system_id = 1
//! host = "10.0.0.1"
//! port = 7001
//! actor_types = [110, 111]
//!
//! [[systems]]
//! system_id = 2
//! host = "10.0.0.2"
//! port = 7002
//! actor_types = [110]
//!
//! [timings]
//! reconnect_interval_ms = 5000
//! ```
//!
//! The order of `systems` is significant: it decides which member dials
//! which.

use crate::error::{ClusterError, Result as ClusterResult};
use crate::types::{ActorType, SystemId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// One cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub system_id: SystemId,
    pub host: String,
    pub port: u16,
    /// Actor types this member hosts
    #[serde(default)]
    pub actor_types: Vec<ActorType>,
}

impl SystemConfig {
    pub fn new(system_id: SystemId, host: impl Into<String>, port: u16, actor_types: Vec<ActorType>) -> Self {
        Self {
            system_id,
            host: host.into(),
            port,
            actor_types,
        }
    }
}

/// Reconnect, polling and grace periods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterTimings {
    pub reconnect_interval_ms: u64,
    pub startup_poll_interval_ms: u64,
    pub watch_proxy_idle_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_frame_size: usize,
}

impl Default for ClusterTimings {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: 5_000,
            startup_poll_interval_ms: 3_000,
            watch_proxy_idle_ms: 10_000,
            connect_timeout_ms: network::DEFAULT_CONNECTION_TIMEOUT_SECS * 1_000,
            max_frame_size: network::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClusterTimings {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn startup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.startup_poll_interval_ms)
    }

    pub fn watch_proxy_idle(&self) -> Duration {
        Duration::from_millis(self.watch_proxy_idle_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Full cluster topology as seen from one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub local_system_id: SystemId,
    pub systems: Vec<SystemConfig>,
    #[serde(default)]
    pub timings: ClusterTimings,
}

impl ClusterConfig {
    pub fn new(local_system_id: SystemId, systems: Vec<SystemConfig>) -> Self {
        Self {
            local_system_id,
            systems,
            timings: ClusterTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: ClusterTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ClusterConfig =
            toml::from_str(text).context("Failed to deserialize cluster configuration")?;
        config.validate().context("Invalid cluster configuration")?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading cluster config: {:?}", path);
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cluster config {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if self.systems.is_empty() {
            return Err(ClusterError::configuration("no cluster members configured", Some("systems")));
        }

        let mut seen = HashSet::new();
        for system in &self.systems {
            if system.system_id.is_none() {
                return Err(ClusterError::configuration(
                    "system id 0 is reserved",
                    Some("systems.system_id"),
                ));
            }
            if !seen.insert(system.system_id) {
                return Err(ClusterError::configuration(
                    format!("duplicate system id {}", system.system_id),
                    Some("systems.system_id"),
                ));
            }
        }

        if self.local_index().is_none() {
            return Err(ClusterError::configuration(
                format!("local system {} is not a cluster member", self.local_system_id),
                Some("local_system_id"),
            ));
        }

        if self.timings.max_frame_size == 0 {
            return Err(ClusterError::configuration(
                "max frame size must be positive",
                Some("timings.max_frame_size"),
            ));
        }

        Ok(())
    }

    /// Position of the local member in the topology
    pub fn local_index(&self) -> Option<usize> {
        self.systems
            .iter()
            .position(|s| s.system_id == self.local_system_id)
    }

    pub fn local(&self) -> Option<&SystemConfig> {
        self.local_index().map(|i| &self.systems[i])
    }

    pub fn member_count(&self) -> usize {
        self.systems.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const THREE_NODES: &str = r#"
local_system_id = 2

[[systems]]
system_id = 1
host = "127.0.0.1"
port = 7001
actor_types = [110, 111]

[[systems]]
system_id = 2
host = "127.0.0.1"
port = 7002

[[systems]]
system_id = 3
host = "127.0.0.1"
port = 7003
actor_types = [110]

[timings]
reconnect_interval_ms = 250
"#;

    #[test]
    fn test_parse_with_partial_timings() {
        let config = ClusterConfig::from_toml_str(THREE_NODES).unwrap();
        assert_eq!(config.local_system_id, SystemId(2));
        assert_eq!(config.local_index(), Some(1));
        assert_eq!(config.member_count(), 3);
        assert_eq!(config.systems[0].actor_types, vec![ActorType(110), ActorType(111)]);
        assert!(config.systems[1].actor_types.is_empty());

        assert_eq!(config.timings.reconnect_interval(), Duration::from_millis(250));
        assert_eq!(config.timings.startup_poll_interval(), Duration::from_secs(3));
        assert_eq!(config.timings.watch_proxy_idle(), Duration::from_secs(10));
    }

    #[test]
    fn test_default_timings() {
        let timings = ClusterTimings::default();
        assert_eq!(timings.reconnect_interval(), Duration::from_secs(5));
        assert_eq!(timings.startup_poll_interval(), Duration::from_secs(3));
        assert_eq!(timings.watch_proxy_idle(), Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_missing_local_member() {
        let config = ClusterConfig::new(
            SystemId(9),
            vec![SystemConfig::new(SystemId(1), "127.0.0.1", 7001, vec![])],
        );
        assert!(matches!(
            config.validate(),
            Err(ClusterError::Configuration { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_and_zero_ids() {
        let duplicate = ClusterConfig::new(
            SystemId(1),
            vec![
                SystemConfig::new(SystemId(1), "a", 1, vec![]),
                SystemConfig::new(SystemId(1), "b", 2, vec![]),
            ],
        );
        assert!(duplicate.validate().is_err());

        let zero = ClusterConfig::new(
            SystemId(1),
            vec![
                SystemConfig::new(SystemId(1), "a", 1, vec![]),
                SystemConfig::new(SystemId(0), "b", 2, vec![]),
            ],
        );
        assert!(zero.validate().is_err());

        assert!(ClusterConfig::new(SystemId(1), vec![]).validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(THREE_NODES.as_bytes()).unwrap();

        let config = ClusterConfig::load(file.path()).unwrap();
        assert_eq!(config.systems[2].system_id, SystemId(3));
    }

    #[test]
    fn test_load_reports_context() {
        let err = ClusterConfig::load("/nonexistent/cluster.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read cluster config"));

        let err = ClusterConfig::from_toml_str("local_system_id = 5\nsystems = []").unwrap_err();
        assert!(format!("{:#}", err).contains("no cluster members"));
    }
}
