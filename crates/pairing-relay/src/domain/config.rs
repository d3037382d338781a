//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It starts from [`RelayConfig::default`] and is refined by zero or more
//! [`ConfigLayer`]s, first from the optional TOML file and then from the
//! command line, so later layers win.
//!
//! No file or environment access happens here; the infrastructure layer and
//! `main.rs` are responsible for producing the layers.

use std::fmt;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pairing_core::protocol::codec::DEFAULT_DISPLAY_LABEL;

/// Errors produced while building or validating a [`RelayConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid bind address '{value}': {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: AddrParseError,
    },

    /// Labels become part of event names, so only lowercase ASCII letters,
    /// digits and `-` are allowed.
    #[error("invalid display label '{0}': use lowercase letters, digits and '-'")]
    InvalidLabel(String),

    #[error("unknown teardown policy '{0}': expected 'pairing' or 'role'")]
    InvalidPolicy(String),

    #[error("{0} must be greater than zero")]
    ZeroBuffer(&'static str),
}

/// What a disconnect removes from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownPolicy {
    /// Either side leaving tears down the whole pairing.
    #[default]
    Pairing,
    /// A controller leaving releases only its own entry, so the display stays
    /// registered and can be paired again.  A display leaving still releases
    /// both entries.
    Role,
}

impl fmt::Display for TeardownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownPolicy::Pairing => f.write_str("pairing"),
            TeardownPolicy::Role => f.write_str("role"),
        }
    }
}

impl FromStr for TeardownPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pairing" => Ok(TeardownPolicy::Pairing),
            "role" => Ok(TeardownPolicy::Role),
            _ => Err(ConfigError::InvalidPolicy(s.to_string())),
        }
    }
}

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use pairing_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 443);
/// assert_eq!(cfg.display_label, "display");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Label of the display role inside event names (`register-<label>`).
    pub display_label: String,

    /// What a disconnect removes from the registry.
    pub teardown_policy: TeardownPolicy,

    /// Capacity of each connection's outbound queue.  Events addressed to a
    /// connection whose queue is full are dropped.
    pub outbound_buffer: usize,

    /// Capacity of the broker task's command queue.
    pub command_buffer: usize,

    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for RelayConfig {
    /// | Field           | Default        |
    /// |-----------------|----------------|
    /// | bind_addr       | `0.0.0.0:443`  |
    /// | display_label   | `display`      |
    /// | teardown_policy | `pairing`      |
    /// | outbound_buffer | 64             |
    /// | command_buffer  | 1024           |
    /// | log_level       | `info`         |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 443)),
            display_label: DEFAULT_DISPLAY_LABEL.to_string(),
            teardown_policy: TeardownPolicy::Pairing,
            outbound_buffer: 64,
            command_buffer: 1024,
            log_level: "info".to_string(),
        }
    }
}

/// A partial set of overrides.  Every field is optional; `None` keeps the
/// value from the layer below.
///
/// The same shape is read from the TOML file:
///
/// ```toml
/// bind = "127.0.0.1"
/// port = 8080
/// display_label = "tv"
/// teardown_policy = "role"
/// outbound_buffer = 32
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub display_label: Option<String>,
    pub teardown_policy: Option<TeardownPolicy>,
    pub outbound_buffer: Option<usize>,
    pub command_buffer: Option<usize>,
    pub log_level: Option<String>,
}

impl RelayConfig {
    /// Applies `layer` on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `layer.bind` is not an IP
    /// address.  The config is left unchanged in that case.
    pub fn apply(&mut self, layer: ConfigLayer) -> Result<(), ConfigError> {
        if let Some(bind) = layer.bind {
            let ip: IpAddr = bind
                .trim()
                .parse()
                .map_err(|source| ConfigError::InvalidAddress {
                    value: bind.clone(),
                    source,
                })?;
            self.bind_addr.set_ip(ip);
        }
        if let Some(port) = layer.port {
            self.bind_addr.set_port(port);
        }
        if let Some(label) = layer.display_label {
            self.display_label = label;
        }
        if let Some(policy) = layer.teardown_policy {
            self.teardown_policy = policy;
        }
        if let Some(n) = layer.outbound_buffer {
            self.outbound_buffer = n;
        }
        if let Some(n) = layer.command_buffer {
            self.command_buffer = n;
        }
        if let Some(level) = layer.log_level {
            self.log_level = level;
        }
        Ok(())
    }

    /// Checks the values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let label_ok = !self.display_label.is_empty()
            && self
                .display_label
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !label_ok {
            return Err(ConfigError::InvalidLabel(self.display_label.clone()));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::ZeroBuffer("outbound_buffer"));
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::ZeroBuffer("command_buffer"));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
