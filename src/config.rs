use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use uuid;

use crate::error::{Result, StarbusError};

/// Member-side transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Identity of this member; tags outbound envelopes and is the address
    /// for direct sends. Immutable for the process lifetime.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    #[serde(default = "default_relay_addr")]
    pub relay_addr: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            relay_addr: default_relay_addr(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ClusterConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Relay process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_max_members")]
    pub max_members: u32,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_members: default_max_members(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl RelayConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Shared lock store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_store_host")]
    pub host: String,

    #[serde(default = "default_store_port")]
    pub port: u16,

    /// Lease length in milliseconds. Store backends apply their native TTL
    /// unit (Redis: whole seconds), so sub-second precision is not
    /// guaranteed.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            port: default_store_port(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub lock: LockConfig,
}

fn default_server_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_relay_addr() -> String {
    "127.0.0.1:7474".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_bind_addr() -> String {
    "127.0.0.1:7474".to_string()
}

fn default_max_members() -> u32 {
    64
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_store_host() -> String {
    "127.0.0.1".to_string()
}

fn default_store_port() -> u16 {
    6379
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!("saving configuration to {}", path.display());
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster.server_name.is_empty() {
            return Err(StarbusError::config("Server name cannot be empty"));
        }

        if self.cluster.relay_addr.split(':').count() != 2 {
            return Err(StarbusError::config("Invalid relay address format"));
        }

        if self.cluster.connect_timeout_ms == 0 {
            return Err(StarbusError::config("Connect timeout cannot be zero"));
        }

        if self.relay.bind_addr.split(':').count() != 2 {
            return Err(StarbusError::config("Invalid bind address format"));
        }

        if self.relay.max_members == 0 {
            return Err(StarbusError::config("Member limit cannot be zero"));
        }

        if self.relay.shutdown_timeout_secs == 0 {
            return Err(StarbusError::config("Shutdown timeout cannot be zero"));
        }

        if self.lock.port == 0 {
            return Err(StarbusError::config("Lock store port cannot be zero"));
        }

        // Leases shorter than the store's one-second TTL granularity cannot
        // be honored.
        if self.lock.lock_timeout_ms < 1000 {
            return Err(StarbusError::config("Lock timeout must be at least 1000 ms"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock.port, 6379);
        assert_eq!(config.lock.lease(), Duration::from_millis(5000));
        assert!(!config.cluster.server_name.is_empty());
    }

    #[test]
    fn sub_second_lease_is_rejected() {
        let mut config = Config::default();
        config.lock.lock_timeout_ms = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_relay_addr_is_rejected() {
        let mut config = Config::default();
        config.cluster.relay_addr = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_server_name_is_rejected() {
        let mut config = Config::default();
        config.cluster.server_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("starbus.yaml");

        let mut config = Config::default();
        config.cluster.server_name = "server-1".to_string();
        config.lock.lock_timeout_ms = 2000;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.cluster.server_name, "server-1");
        assert_eq!(loaded.lock.lock_timeout_ms, 2000);
        assert_eq!(loaded.relay.bind_addr, config.relay.bind_addr);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_yaml::from_str("cluster:\n  server_name: partial\n").unwrap();
        assert_eq!(config.cluster.server_name, "partial");
        assert_eq!(config.cluster.relay_addr, "127.0.0.1:7474");
        assert_eq!(config.lock.lock_timeout_ms, 5000);
    }
}
