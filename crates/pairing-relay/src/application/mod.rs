//! Application layer for pairing-relay.
//!
//! Knows *what* happens to each inbound event but not how bytes move.
//!
//! - [`router`]: where a relayed event goes, as a value.
//! - [`lifecycle`]: what a disconnect removes from the registry.
//! - [`broker`]: the stateful broker that applies both and talks to the
//!   outbound [`EventSink`]s.
//!
//! Nothing here spawns tasks or touches sockets.

pub mod broker;
pub mod lifecycle;
pub mod router;

pub use broker::{Broker, BrokerStats, DeliveryError, EventSink};
pub use lifecycle::{teardown, Teardown};
pub use router::{route, DropReason, RelayEvent, Route};
