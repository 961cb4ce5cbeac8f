//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use kite_common::{DEFAULT_CONTEXT_TTL_SECS, DEFAULT_MAX_CONTEXTS};
use kite_store::StoreOptions;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Data directory for a persistent storage engine.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Apply mutations directly, bypassing the replication rings.
    #[serde(default)]
    pub standalone: bool,

    /// Number of replication rings (shards) on this node.
    #[serde(default = "default_rings")]
    pub rings: usize,

    /// Submission queue depth per ring.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Cap on concurrently live scan contexts.
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,

    /// Idle lifetime of a paused scan context, in seconds.
    #[serde(default = "default_context_ttl")]
    pub context_ttl_secs: u64,

    /// Interval between context sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Peer base URLs to catch up from at startup.
    #[serde(default)]
    pub peers: Vec<String>,

    /// Tables to pull from each peer at startup.
    #[serde(default)]
    pub catch_up_tables: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7070
}

fn default_rings() -> usize {
    1
}

fn default_queue_depth() -> usize {
    256
}

fn default_max_contexts() -> usize {
    DEFAULT_MAX_CONTEXTS
}

fn default_context_ttl() -> u64 {
    DEFAULT_CONTEXT_TTL_SECS
}

fn default_sweep_interval() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            standalone: false,
            rings: default_rings(),
            queue_depth: default_queue_depth(),
            max_contexts: default_max_contexts(),
            context_ttl_secs: default_context_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            peers: Vec::new(),
            catch_up_tables: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns the socket address.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Store options derived from this configuration.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_contexts: self.max_contexts,
            context_ttl: Duration::from_secs(self.context_ttl_secs),
        }
    }

    /// Creates a builder for configuration.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }
}

/// Builder for server configuration.
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the data directory.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    /// Enables standalone mode.
    pub fn standalone(mut self, enabled: bool) -> Self {
        self.config.standalone = enabled;
        self
    }

    /// Sets the number of rings.
    pub fn rings(mut self, rings: usize) -> Self {
        self.config.rings = rings;
        self
    }

    /// Sets the per-ring queue depth.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.config.queue_depth = depth;
        self
    }

    /// Sets the scan context cap.
    pub fn max_contexts(mut self, max: usize) -> Self {
        self.config.max_contexts = max;
        self
    }

    /// Sets the scan context TTL in seconds.
    pub fn context_ttl_secs(mut self, secs: u64) -> Self {
        self.config.context_ttl_secs = secs;
        self
    }

    /// Sets the catch-up peers.
    pub fn peers(mut self, peers: Vec<String>) -> Self {
        self.config.peers = peers;
        self
    }

    /// Sets the tables pulled from peers at startup.
    pub fn catch_up_tables(mut self, tables: Vec<String>) -> Self {
        self.config.catch_up_tables = tables;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7070);
        assert_eq!(config.rings, 1);
        assert!(!config.standalone);
        assert!(config.data_dir.is_none());
        assert_eq!(config.max_contexts, DEFAULT_MAX_CONTEXTS);
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::builder()
            .host("localhost")
            .port(7171)
            .standalone(true)
            .rings(3)
            .max_contexts(64)
            .build();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 7171);
        assert!(config.standalone);
        assert_eq!(config.rings, 3);
        assert_eq!(config.max_contexts, 64);
    }

    #[test]
    fn test_to_toml() {
        let config = ServerConfig::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("host"));
        assert!(toml.contains("port"));
        assert!(toml.contains("rings"));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = ServerConfig::builder()
            .host("testhost")
            .port(9999)
            .peers(vec!["http://peer:7070".to_string()])
            .build();

        config.save(&path).unwrap();

        let loaded = ServerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.host, "testhost");
        assert_eq!(loaded.port, 9999);
        assert_eq!(loaded.peers, vec!["http://peer:7070".to_string()]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.toml");
        std::fs::write(&path, "port = 8181\n").unwrap();

        let loaded = ServerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.port, 8181);
        assert_eq!(loaded.host, "0.0.0.0");
        assert_eq!(loaded.queue_depth, 256);
    }

    #[test]
    fn test_store_options() {
        let config = ServerConfig::builder()
            .max_contexts(7)
            .context_ttl_secs(3)
            .build();
        let options = config.store_options();
        assert_eq!(options.max_contexts, 7);
        assert_eq!(options.context_ttl, Duration::from_secs(3));
    }
}
