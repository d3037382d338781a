//! Domain layer for pairing-relay.
//!
//! Plain configuration types with no I/O.  Reading the TOML file lives in
//! `infrastructure::config_file`; reading CLI flags and environment variables
//! lives in `main.rs`.

pub mod config;

pub use config::{ConfigError, ConfigLayer, RelayConfig, TeardownPolicy};
