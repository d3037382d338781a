//! # pairing-core
//!
//! Shared library for the pairing relay containing the pairing-code domain,
//! the connection registry, and the JSON wire protocol.
//!
//! It has zero dependencies on sockets or async runtimes; the relay service
//! (`pairing-relay`) owns all I/O and drives these types from a single broker
//! task.
//!
//! # Architecture overview
//!
//! Two kinds of endpoint meet at the relay:
//!
//! - a **display**, which registers and is handed a 6-digit code to show, and
//! - a **controller**, which types that code in to join the display.
//!
//! ```text
//! display ──register──► [ConnectionRegistry] ◄──connect(code)── controller
//!                              │
//!                     code → display id
//!                     code → controller id
//! ```
//!
//! - **`domain`** – Pairing codes, the code generator, connection identifiers
//!   and roles, and the registry that maps codes to connections.
//!
//! - **`protocol`** – The `{"event": ..., "data": ...}` envelope carried in
//!   WebSocket text frames and the event-name vocabulary.

pub mod domain;
pub mod protocol;

pub use domain::code::{CodeError, CodeGenerator, PairingCode};
pub use domain::connection::{Association, ConnectionId, Role};
pub use domain::registry::{ConnectionRegistry, RegistryError};
pub use protocol::codec::{Envelope, EventNames, ProtocolError};
pub use protocol::messages::{BroadcastName, ClientEvent, ServerEvent};
