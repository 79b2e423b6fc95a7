//! Configuration for ringproxy components

use crate::common::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Environment variable naming the TOML config file
pub const CONFIG_ENV: &str = "RINGPROXY_CONFIG";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Proxy-specific config
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Storage node config (development account server)
    #[serde(default)]
    pub node: NodeConfig,

    /// Partition table
    #[serde(default)]
    pub ring: RingConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the file named by `RINGPROXY_CONFIG`
    /// (default `config.toml`, optional), then `RINGPROXY_*` environment
    /// variables, e.g. `RINGPROXY_PROXY__ACCOUNT_AUTOCREATE=true`.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".to_string());
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(environment())
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.proxy.max_account_name_length == 0 {
            return Err(crate::Error::InvalidConfig(
                "max_account_name_length must be positive".into(),
            ));
        }
        if self.proxy.read_concurrency == 0 {
            return Err(crate::Error::InvalidConfig(
                "read_concurrency must be positive".into(),
            ));
        }
        if self.ring.partitions == 0 || self.ring.replicas == 0 {
            return Err(crate::Error::InvalidConfig(
                "ring needs at least one partition and one replica".into(),
            ));
        }
        Ok(())
    }
}

/// `RINGPROXY_` then `__` between nesting levels
fn environment() -> config::Environment {
    config::Environment::with_prefix("RINGPROXY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Bind address for the client-facing HTTP API
    #[serde(default = "default_proxy_bind")]
    pub bind_addr: SocketAddr,

    /// Allow account PUT and DELETE
    #[serde(default)]
    pub allow_account_management: bool,

    /// Treat missing accounts as existing (reads) and create them on POST
    #[serde(default)]
    pub account_autocreate: bool,

    /// Maximum account name length in bytes
    #[serde(default = "default_max_account_name_length")]
    pub max_account_name_length: usize,

    /// Per-node request timeout
    #[serde(default = "default_node_timeout")]
    pub node_timeout_ms: u64,

    /// Replicas in flight during a read scan
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

fn default_proxy_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
fn default_max_account_name_length() -> usize {
    crate::common::constraints::MAX_ACCOUNT_NAME_LENGTH
}
fn default_node_timeout() -> u64 {
    10_000
}
fn default_read_concurrency() -> usize {
    1
}

impl ProxyConfig {
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_proxy_bind(),
            allow_account_management: false,
            account_autocreate: false,
            max_account_name_length: default_max_account_name_length(),
            node_timeout_ms: default_node_timeout(),
            read_concurrency: default_read_concurrency(),
        }
    }
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bind address for the internal account API
    #[serde(default = "default_node_bind")]
    pub bind_addr: SocketAddr,

    /// Device name served by this node
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_node_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 6002))
}
fn default_device() -> String {
    "sda1".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_node_bind(),
            device: default_device(),
        }
    }
}

/// One storage endpoint in the partition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: u64,
    /// host:port
    pub address: String,
    #[serde(default = "default_device")]
    pub device: String,
}

/// Partition table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingConfig {
    /// Number of partitions in the keyspace
    #[serde(default = "default_partitions")]
    pub partitions: u64,

    /// Replicas per partition
    #[serde(default = "default_replicas")]
    pub replicas: usize,

    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,
}

fn default_partitions() -> u64 {
    1024
}
fn default_replicas() -> usize {
    3
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            replicas: default_replicas(),
            nodes: Vec::new(),
        }
    }
}
