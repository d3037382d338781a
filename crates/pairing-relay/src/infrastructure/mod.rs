//! Infrastructure layer for pairing-relay.
//!
//! All I/O lives here: the WebSocket listener and sessions, the broker task
//! that serialises access to pairing state, and the TOML config loader.
//!
//! # What does NOT belong here?
//!
//! - Pairing, routing and teardown rules (application layer)
//! - Configuration types and validation (domain layer)
//! - CLI parsing (done in `main.rs`)

pub mod broker_task;
pub mod config_file;
pub mod ws_server;

pub use broker_task::{spawn_broker, BrokerCommand, BrokerGone, BrokerHandle};
pub use config_file::{load_config_layer, ConfigFileError};
pub use ws_server::{run_server, serve};
