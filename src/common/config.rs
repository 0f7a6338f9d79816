//! Configuration for placekv components
//!
//! Values come from an optional `placekv.toml`, then `PLACEKV__*` environment
//! variables (e.g. `PLACEKV__COORDINATOR__SWEEP_INTERVAL_SECS=60`), and the
//! binaries let their CLI flags override both.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Config file looked up by [`Config::load`]
pub const DEFAULT_CONFIG_FILE: &str = "placekv.toml";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    pub node: NodeConfig,
    pub proxy: ProxyConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from the default file and environment, falling back to defaults on error
    pub fn load() -> Self {
        match Self::load_from(DEFAULT_CONFIG_FILE) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Load from `path` (optional) layered under `PLACEKV__*` environment variables
    pub fn load_from(path: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("PLACEKV").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// TLS material for a listening server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Bind address for the RPC surface
    pub bind_addr: SocketAddr,

    /// Minimum time between two expiration sweeps
    pub sweep_interval_secs: u64,

    /// Snapshot loaded at startup and written on shutdown
    pub snapshot_path: Option<PathBuf>,

    pub tls: Option<TlsConfig>,
}

impl CoordinatorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            sweep_interval_secs: 300,
            snapshot_path: None,
            tls: None,
        }
    }
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Bind address for the blob surface
    pub bind_addr: SocketAddr,

    /// URL other components use to reach this node; derived from `bind_addr` when unset
    pub advertise_url: Option<String>,

    /// Coordinator to register with
    pub coordinator_url: String,

    /// On-disk content directory; content is kept in memory when unset
    pub data_path: Option<PathBuf>,

    /// Largest accepted blob
    pub max_blob_size: u64,

    pub tls: Option<TlsConfig>,
}

impl NodeConfig {
    pub fn advertise_url(&self) -> String {
        match &self.advertise_url {
            Some(url) => url.clone(),
            None => {
                let scheme = if self.tls.is_some() { "https" } else { "http" };
                format!("{}://{}", scheme, self.bind_addr)
            }
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            advertise_url: None,
            coordinator_url: "http://127.0.0.1:8443".to_string(),
            data_path: None,
            max_blob_size: 64 * 1024 * 1024,
            tls: None,
        }
    }
}

/// Client-side proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub coordinator_url: String,

    /// Upper bound for every RPC issued by the proxy
    pub rpc_timeout_ms: u64,

    /// TTL applied by `put` when the caller does not pick one
    pub default_ttl_secs: u64,

    /// Extra PEM trust root for self-signed coordinator/node certificates
    pub ca_cert_path: Option<PathBuf>,
}

impl ProxyConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://127.0.0.1:8443".to_string(),
            rpc_timeout_ms: 5_000,
            default_ttl_secs: 10_000,
            ca_cert_path: None,
        }
    }
}
