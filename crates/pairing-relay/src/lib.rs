//! pairing-relay library crate.
//!
//! A WebSocket broker that pairs a *display* (the endpoint showing a pairing
//! code) with a *controller* (the endpoint that types the code in) and relays
//! credential and login-result events between them.
//!
//! # Architecture
//!
//! ```text
//! display / controller  (JSON over WebSocket)
//!         ↕
//! [pairing-relay]
//!   ├── domain/           RelayConfig, TeardownPolicy, config layering
//!   ├── application/      Broker, router, teardown rules
//!   └── infrastructure/
//!         ├── ws_server/    accept loop and per-session tasks
//!         ├── broker_task/  single task owning the Broker
//!         └── config_file/  optional TOML overrides
//! ```
//!
//! Codes, the registry and the wire vocabulary live in `pairing-core`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: pairing, routing and teardown.
pub mod application;

/// Infrastructure layer: WebSocket server, broker task, config file.
pub mod infrastructure;
