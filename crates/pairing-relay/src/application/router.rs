//! Message routing: decides where a relayed event goes.
//!
//! Routing is a pure function of the registry and the source connection.  It
//! returns a [`Route`] describing the delivery instead of performing it, so
//! the rules can be tested without any transport.
//!
//! # Rules
//!
//! ```text
//! login-result      display    ──► paired controller   (login-result-client)
//! send-credentials  controller ──► paired display      (receive-credentials)
//! broadcast-test    anyone     ──► every connection    (same name as received)
//! ```
//!
//! The paired events are strictly 1:1.  They are dropped when the source has
//! not registered or paired, holds the wrong role, no longer owns its code, or
//! has no peer at that code.

use std::fmt;

use rand::Rng;
use serde_json::Value;

use pairing_core::{
    BroadcastName, ConnectionId, ConnectionRegistry, PairingCode, Role, ServerEvent,
};

/// The relayable subset of client events.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    LoginResult(Value),
    SendCredentials(Value),
    BroadcastTest { name: BroadcastName, data: Value },
}

/// Why a relayed event went nowhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The source never registered or paired.
    Unassociated,
    /// The source holds the other role.
    WrongRole { expected: Role, actual: Role },
    /// The source's pairing was torn down or taken over.
    Stale { code: PairingCode },
    /// Nobody holds the peer role at the source's code.
    NoPeer { code: PairingCode },
}

impl DropReason {
    /// Whether the source is properly paired but its peer is missing.
    pub fn is_peer_missing(&self) -> bool {
        matches!(self, DropReason::Stale { .. } | DropReason::NoPeer { .. })
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Unassociated => f.write_str("source is not paired"),
            DropReason::WrongRole { expected, actual } => {
                write!(f, "source is a {actual}, event requires a {expected}")
            }
            DropReason::Stale { code } => write!(f, "pairing {code} no longer held by source"),
            DropReason::NoPeer { code } => write!(f, "no peer at {code}"),
        }
    }
}

/// Where an event should be delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Exactly one recipient.
    Unicast { to: ConnectionId, event: ServerEvent },
    /// Every connected connection, source included, once each.
    Broadcast(ServerEvent),
    /// Nothing is delivered.
    Drop(DropReason),
}

/// Resolves the destination of `event` sent by `source`.
pub fn route<R: Rng>(
    registry: &ConnectionRegistry<R>,
    source: ConnectionId,
    event: RelayEvent,
) -> Route {
    match event {
        RelayEvent::LoginResult(payload) => match peer_of(registry, source, Role::Display) {
            Ok(to) => Route::Unicast {
                to,
                event: ServerEvent::LoginResultClient(payload),
            },
            Err(reason) => Route::Drop(reason),
        },
        RelayEvent::SendCredentials(payload) => {
            match peer_of(registry, source, Role::Controller) {
                Ok(to) => Route::Unicast {
                    to,
                    event: ServerEvent::ReceiveCredentials(payload),
                },
                Err(reason) => Route::Drop(reason),
            }
        }
        RelayEvent::BroadcastTest { name, data } => {
            Route::Broadcast(ServerEvent::BroadcastTest { name, data })
        }
    }
}

fn peer_of<R: Rng>(
    registry: &ConnectionRegistry<R>,
    source: ConnectionId,
    expected: Role,
) -> Result<ConnectionId, DropReason> {
    let association = registry
        .association(source)
        .ok_or(DropReason::Unassociated)?;
    if association.role != expected {
        return Err(DropReason::WrongRole {
            expected,
            actual: association.role,
        });
    }
    let code = association.code;
    if !registry.owns(source) {
        return Err(DropReason::Stale { code });
    }
    registry
        .lookup(code, expected.peer())
        .ok_or(DropReason::NoPeer { code })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
