//! Connection identities, roles, and the association record that ties a
//! connection to a pairing code.

use std::fmt;

use uuid::Uuid;

use super::code::PairingCode;

/// Opaque identifier for one transport connection.
///
/// The registry never holds the transport object itself, only this id; the
/// transport layer owns the connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The two sides of a pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Registers first and shows the pairing code.
    Display,
    /// Joins an existing display by typing its code.
    Controller,
}

impl Role {
    /// The role on the other side of a pairing.
    pub fn peer(self) -> Role {
        match self {
            Role::Display => Role::Controller,
            Role::Controller => Role::Display,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Display => "display",
            Role::Controller => "controller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{connection, role, code}` record kept by the registry for every
/// connection that has registered or paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    pub connection: ConnectionId,
    pub role: Role,
    pub code: PairingCode,
}
