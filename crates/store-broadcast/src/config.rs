//! # Broadcast Configuration
//!
//! Configuration for the broadcaster and the receiver.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STORE_BROADCAST_ADDR=192.168.1.255                                 │
//! │     STORE_BROADCAST_PORT=45454                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/storemanager/broadcast.toml (Linux)                      │
//! │     ~/Library/Application Support/com.store.storemanager/... (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     255.255.255.255:45454 every 5 seconds                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # broadcast.toml
//! [store]
//! id = "store-001"
//! name = "Main Street Books"
//!
//! [broadcast]
//! address = "255.255.255.255"   # or a subnet broadcast such as 192.168.1.255
//! port = 45454
//! bind_addr = "0.0.0.0"
//! interval_ms = 5000
//! max_datagram_bytes = 8192
//!
//! [receiver]
//! bind_addr = "0.0.0.0"
//! port = 45454
//! history = 200
//! ```

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BroadcastError, BroadcastResult};

// =============================================================================
// Constants
// =============================================================================

/// Default UDP port shared by broadcaster and receiver.
pub const DEFAULT_BROADCAST_PORT: u16 = 45454;

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// Smallest datagram size limit accepted by validation.
pub const MIN_DATAGRAM_BYTES: usize = 256;

/// Shortest accepted broadcast interval.
pub const MIN_INTERVAL_MS: u64 = 10;

// =============================================================================
// Store Configuration
// =============================================================================

/// Identity of the store, carried in every datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Unique store identifier.
    pub id: String,

    /// Human-readable store name.
    #[serde(default)]
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            id: "default-store".to_string(),
            name: "Default Store".to_string(),
        }
    }
}

// =============================================================================
// Broadcast Settings
// =============================================================================

/// Sender-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSettings {
    /// Destination address: limited broadcast or a subnet broadcast address.
    #[serde(default = "default_broadcast_address")]
    pub address: Ipv4Addr,

    /// Destination port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Local interface to send from (port is always ephemeral).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: Ipv4Addr,

    /// Time between broadcast cycles (milliseconds).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound for one datagram, header included.
    #[serde(default = "default_max_datagram_bytes")]
    pub max_datagram_bytes: usize,
}

fn default_broadcast_address() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_port() -> u16 {
    DEFAULT_BROADCAST_PORT
}

fn default_bind_addr() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_max_datagram_bytes() -> usize {
    8192
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        BroadcastSettings {
            address: default_broadcast_address(),
            port: default_port(),
            bind_addr: default_bind_addr(),
            interval_ms: default_interval_ms(),
            max_datagram_bytes: default_max_datagram_bytes(),
        }
    }
}

impl BroadcastSettings {
    /// Where datagrams are sent.
    pub fn target(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }

    /// Local address the send socket binds to.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_addr, 0))
    }

    /// Broadcast cycle period, never shorter than `MIN_INTERVAL_MS`.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_INTERVAL_MS))
    }
}

// =============================================================================
// Receiver Settings
// =============================================================================

/// Listener-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverSettings {
    /// Local interface to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: Ipv4Addr,

    /// Port to listen on. 0 picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of rendered lines kept for display.
    #[serde(default = "default_history")]
    pub history: usize,
}

fn default_history() -> usize {
    200
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        ReceiverSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
            history: default_history(),
        }
    }
}

impl ReceiverSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_addr, self.port))
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete broadcast configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Store identity.
    #[serde(default)]
    pub store: StoreConfig,

    /// Sender settings.
    #[serde(default)]
    pub broadcast: BroadcastSettings,

    /// Receiver settings.
    #[serde(default)]
    pub receiver: ReceiverSettings,
}

impl BroadcastConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (broadcast.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> BroadcastResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading broadcast config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        let env: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("STORE_"))
            .collect();
        config.apply_overrides(&env);

        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load broadcast config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> BroadcastResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| BroadcastError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Broadcast config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BroadcastResult<()> {
        if self.store.id.trim().is_empty() {
            return Err(BroadcastError::InvalidConfig(
                "store.id must not be empty".into(),
            ));
        }

        if self.broadcast.port == 0 {
            return Err(BroadcastError::InvalidConfig(
                "broadcast.port must not be 0".into(),
            ));
        }

        if self.broadcast.interval_ms < MIN_INTERVAL_MS {
            return Err(BroadcastError::InvalidConfig(format!(
                "broadcast.interval_ms must be at least {}, got {}",
                MIN_INTERVAL_MS, self.broadcast.interval_ms
            )));
        }

        if !(MIN_DATAGRAM_BYTES..=MAX_UDP_PAYLOAD).contains(&self.broadcast.max_datagram_bytes) {
            return Err(BroadcastError::InvalidConfig(format!(
                "broadcast.max_datagram_bytes must be between {} and {}, got {}",
                MIN_DATAGRAM_BYTES, MAX_UDP_PAYLOAD, self.broadcast.max_datagram_bytes
            )));
        }

        if self.receiver.history == 0 {
            return Err(BroadcastError::InvalidConfig(
                "receiver.history must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `STORE_*` overrides from the given variable map.
    fn apply_overrides(&mut self, env: &HashMap<String, String>) {
        if let Some(id) = env.get("STORE_ID") {
            debug!(store_id = %id, "Overriding store ID from environment");
            self.store.id = id.clone();
        }

        if let Some(name) = env.get("STORE_NAME") {
            self.store.name = name.clone();
        }

        if let Some(addr) = env.get("STORE_BROADCAST_ADDR") {
            match addr.parse::<Ipv4Addr>() {
                Ok(a) => {
                    debug!(address = %a, "Overriding broadcast address from environment");
                    self.broadcast.address = a;
                }
                Err(_) => warn!(address = %addr, "Invalid broadcast address in environment"),
            }
        }

        if let Some(port) = env.get("STORE_BROADCAST_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding broadcast port from environment");
                    self.broadcast.port = p;
                }
                Err(_) => warn!(port = %port, "Invalid broadcast port in environment"),
            }
        }

        if let Some(interval) = env.get("STORE_BROADCAST_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.broadcast.interval_ms = ms,
                Err(_) => warn!(interval = %interval, "Invalid broadcast interval in environment"),
            }
        }

        if let Some(port) = env.get("STORE_RECEIVER_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding receiver port from environment");
                    self.receiver.port = p;
                }
                Err(_) => warn!(port = %port, "Invalid receiver port in environment"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "store", "storemanager")
            .map(|dirs| dirs.config_dir().join("broadcast.toml"))
    }
}
