//! Configuration system for lanlink.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LANLINK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lanlink/config.toml
//!   3. ~/.config/lanlink/config.toml

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{
    DEFAULT_ENVELOPE_OVERHEAD, DEFAULT_FRAGMENT_TIMEOUT_SECS, DEFAULT_MAX_CHUNK_TOTAL,
    DEFAULT_MAX_SAFE_DATAGRAM,
};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanlinkConfig {
    pub node: NodeConfig,
    pub network: NetworkConfig,
    pub transport: TransportConfig,
    pub bind: BindConfig,
    pub clients: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identifier stamped into outbound call requests and signals.
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local UDP port to receive on.
    pub udp_port: u16,
    /// Local address to bind the UDP socket to.
    pub bind_addr: IpAddr,
    /// Destination address for outbound datagrams.
    pub broadcast_addr: IpAddr,
    /// Ports every outbound datagram is sent to.
    pub broadcast_ports: Vec<u16>,
    /// HTTP/WebSocket port for live clients.
    pub api_port: u16,
    /// HTTP/WebSocket bind address.
    pub api_bind: IpAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Payloads up to this size go out as a single datagram.
    pub max_safe_datagram: usize,
    /// Bytes of each fragment datagram reserved for the envelope.
    pub envelope_overhead: usize,
    /// Partial messages older than this are discarded.
    pub fragment_timeout_secs: u64,
    /// Receive timeout; bounds how long shutdown can take to be noticed.
    pub recv_timeout_ms: u64,
    /// Largest `chunk_total` accepted from the network.
    pub max_chunk_total: u32,
    /// Maximum number of partial messages held at once.
    pub max_pending_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Bind attempts before startup fails.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles per attempt.
    pub base_delay_ms: u64,
    /// Ceiling on the retry delay.
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-connection outbound queue capacity. A full queue counts as a
    /// failed delivery and the connection is dropped.
    pub queue_depth: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for LanlinkConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            network: NetworkConfig::default(),
            transport: TransportConfig::default(),
            bind: BindConfig::default(),
            clients: ClientConfig::default(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: "node-1".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            udp_port: 9001,
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            broadcast_addr: IpAddr::from([255, 255, 255, 255]),
            broadcast_ports: vec![9001],
            api_port: 8000,
            api_bind: IpAddr::from([127, 0, 0, 1]),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_safe_datagram: DEFAULT_MAX_SAFE_DATAGRAM,
            envelope_overhead: DEFAULT_ENVELOPE_OVERHEAD,
            fragment_timeout_secs: DEFAULT_FRAGMENT_TIMEOUT_SECS,
            recv_timeout_ms: 1000,
            max_chunk_total: DEFAULT_MAX_CHUNK_TOTAL,
            max_pending_messages: 1024,
        }
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 8000,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { queue_depth: 64 }
    }
}

impl TransportConfig {
    /// Payload bytes carried by each fragment.
    pub fn chunk_size(&self) -> usize {
        self.max_safe_datagram.saturating_sub(self.envelope_overhead)
    }

    pub fn fragment_timeout(&self) -> Duration {
        Duration::from_secs(self.fragment_timeout_secs)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

impl BindConfig {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("lanlink")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LanlinkConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            LanlinkConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LANLINK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LanlinkConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject settings the transport cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.transport;
        if t.envelope_overhead >= t.max_safe_datagram {
            return Err(ConfigError::Invalid(format!(
                "envelope_overhead ({}) must be smaller than max_safe_datagram ({})",
                t.envelope_overhead, t.max_safe_datagram
            )));
        }
        if t.fragment_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fragment_timeout_secs must be > 0".into()));
        }
        if t.recv_timeout_ms == 0 {
            return Err(ConfigError::Invalid("recv_timeout_ms must be > 0".into()));
        }
        if t.max_chunk_total == 0 || t.max_pending_messages == 0 {
            return Err(ConfigError::Invalid(
                "max_chunk_total and max_pending_messages must be > 0".into(),
            ));
        }
        if self.bind.max_attempts == 0 {
            return Err(ConfigError::Invalid("bind.max_attempts must be > 0".into()));
        }
        if self.network.broadcast_ports.is_empty() {
            return Err(ConfigError::Invalid("broadcast_ports must not be empty".into()));
        }
        if self.clients.queue_depth == 0 {
            return Err(ConfigError::Invalid("clients.queue_depth must be > 0".into()));
        }
        Ok(())
    }

    /// Apply LANLINK_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// `NODE_ID`, `UDP_PORT` and `WEB_PORT` are honoured for compatibility
    /// with multi-node launch scripts; the `LANLINK_*` forms win when both
    /// are set.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |primary: &str, legacy: &str| lookup(primary).or_else(|| lookup(legacy));

        if let Some(v) = get("LANLINK_NODE__ID", "NODE_ID") {
            // Bare numeric ids from launch scripts become "node-<n>".
            self.node.id = if v.chars().all(|c| c.is_ascii_digit()) {
                format!("node-{v}")
            } else {
                v
            };
        }
        if let Some(p) = get("LANLINK_NETWORK__UDP_PORT", "UDP_PORT").and_then(|v| v.parse().ok()) {
            self.network.udp_port = p;
        }
        if let Some(p) = get("LANLINK_NETWORK__API_PORT", "WEB_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(a) = lookup("LANLINK_NETWORK__BROADCAST_ADDR").and_then(|v| v.parse().ok()) {
            self.network.broadcast_addr = a;
        }
        if let Some(v) = lookup("LANLINK_NETWORK__BROADCAST_PORTS") {
            let ports: Vec<u16> = v
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect();
            if !ports.is_empty() {
                self.network.broadcast_ports = ports;
            }
        }
        if let Some(n) = lookup("LANLINK_TRANSPORT__MAX_SAFE_DATAGRAM").and_then(|v| v.parse().ok()) {
            self.transport.max_safe_datagram = n;
        }
        if let Some(n) =
            lookup("LANLINK_TRANSPORT__FRAGMENT_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.transport.fragment_timeout_secs = n;
        }
        if let Some(n) = lookup("LANLINK_BIND__MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.bind.max_attempts = n;
        }
        if let Some(n) = lookup("LANLINK_BIND__BASE_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.bind.base_delay_ms = n;
        }
    }
}
