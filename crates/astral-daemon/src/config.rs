//! Configuration file management.
//!
//! TOML at `$ASTRAL_DATA_DIR/config.toml`; every field has a default so a
//! missing file yields a working isolated-node configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use astral_dht::DhtConfig;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Network settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Identity settings.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// DHT engine settings.
    #[serde(default)]
    pub dht: DhtSection,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address for the wire listener.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Address peers should dial back. Empty = same as listen_addr.
    #[serde(default)]
    pub advertise_address: String,
    /// Seed nodes for bootstrap, `host:port`.
    #[serde(default)]
    pub bootstrap_seeds: Vec<String>,
}

/// Identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Display name. Empty = derived from the hostname.
    #[serde(default)]
    pub name: String,
    /// Derive a stable id from host properties instead of a random one.
    #[serde(default = "default_true")]
    pub stable_id: bool,
    /// Extra entropy mixed into stable id derivation.
    #[serde(default)]
    pub user_seed: String,
    /// Sponsor system id (UUID). Empty = this node is a network root.
    #[serde(default)]
    pub sponsor_id: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// DHT engine settings; all timers in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhtSection {
    #[serde(default = "default_alpha")]
    pub alpha: usize,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_announce_interval")]
    pub announce_interval_secs: u64,
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,
    #[serde(default = "default_gossip_validation_interval")]
    pub gossip_validation_interval_secs: u64,
    #[serde(default = "default_cache_prune_interval")]
    pub cache_prune_interval_secs: u64,
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_secs: u64,
    #[serde(default = "default_verification_cutoff")]
    pub verification_cutoff_secs: u64,
    #[serde(default = "default_max_fail_count")]
    pub max_fail_count: u32,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Run as a private network allowed to root its own genesis.
    #[serde(default)]
    pub isolated_network: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_listen_addr() -> String {
    "0.0.0.0:4817".to_string()
}

fn default_true() -> bool {
    true
}

fn default_alpha() -> usize {
    3
}

fn default_k() -> usize {
    20
}

fn default_request_timeout() -> u64 {
    5
}

fn default_announce_interval() -> u64 {
    30 * 60
}

fn default_liveness_interval() -> u64 {
    5 * 60
}

fn default_gossip_validation_interval() -> u64 {
    5 * 60
}

fn default_cache_prune_interval() -> u64 {
    2 * 3600
}

fn default_cache_max_age() -> u64 {
    48 * 3600
}

fn default_verification_cutoff() -> u64 {
    36 * 3600
}

fn default_max_fail_count() -> u32 {
    6
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            advertise_address: String::new(),
            bootstrap_seeds: Vec::new(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            stable_id: true,
            user_seed: String::new(),
            sponsor_id: String::new(),
        }
    }
}

impl Default for DhtSection {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            k: default_k(),
            request_timeout_secs: default_request_timeout(),
            announce_interval_secs: default_announce_interval(),
            liveness_interval_secs: default_liveness_interval(),
            gossip_validation_interval_secs: default_gossip_validation_interval(),
            cache_prune_interval_secs: default_cache_prune_interval(),
            cache_max_age_secs: default_cache_max_age(),
            verification_cutoff_secs: default_verification_cutoff(),
            max_fail_count: default_max_fail_count(),
            max_body_bytes: default_max_body_bytes(),
            isolated_network: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// The address peers should dial back.
    pub fn advertise_address(&self) -> String {
        if self.network.advertise_address.is_empty() {
            self.network.listen_addr.clone()
        } else {
            self.network.advertise_address.clone()
        }
    }

    /// Translate the `[dht]` section into the engine configuration.
    pub fn dht_config(&self) -> DhtConfig {
        let d = &self.dht;
        DhtConfig {
            alpha: d.alpha,
            k: d.k,
            request_timeout: Duration::from_secs(d.request_timeout_secs),
            announce_interval: Duration::from_secs(d.announce_interval_secs),
            liveness_interval: Duration::from_secs(d.liveness_interval_secs),
            gossip_validation_interval: Duration::from_secs(d.gossip_validation_interval_secs),
            cache_prune_interval: Duration::from_secs(d.cache_prune_interval_secs),
            cache_max_age: Duration::from_secs(d.cache_max_age_secs),
            verification_cutoff: Duration::from_secs(d.verification_cutoff_secs),
            max_fail_count: d.max_fail_count,
            max_body_bytes: d.max_body_bytes,
            isolated_network: d.isolated_network,
            ..DhtConfig::default()
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("ASTRAL_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("ASTRAL_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            home_fallback("Library/Application Support/Astral")
        }
        #[cfg(not(target_os = "macos"))]
        {
            home_fallback(".astral")
        }
    }
}

/// Fallback home directory resolution.
fn home_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/astral"))
}
