//! ConnectionRegistry: maps pairing codes to the display and controller
//! connections that share them.
//!
//! The registry keeps three tables:
//!
//! ```text
//! displays:      code          → display ConnectionId
//! controllers:   code          → controller ConnectionId
//! associations:  ConnectionId  → {role, code}
//! ```
//!
//! The first two are the pairing itself.  The third records which code and
//! role each connection took, so routing and teardown never need to store
//! anything on the transport object.
//!
//! # Ownership
//!
//! An association outlives the table entry it was created for when the peer
//! tears the pairing down, or when a newer controller replaces an older one
//! on the same code.  [`ConnectionRegistry::owns`] tells the two cases apart:
//! a connection owns its code only while the table entry for its role still
//! points back at it.
//!
//! A connection whose entry is gone may take the same role again: a display
//! whose pairing was torn down can ask for a new code, and a controller
//! whose display left can join another one.  Switching roles is never
//! allowed.
//!
//! Each mutating method performs one insert or remove per table, and the
//! registry is driven by a single owner, so no caller ever observes a
//! half-built pairing.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use super::code::{CodeGenerator, PairingCode};
use super::connection::{Association, ConnectionId, Role};

/// Errors returned by registration and pairing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The connection still holds its entry, or holds the other role.
    #[error("connection {connection} is already associated as {role} with code {code}")]
    AlreadyAssociated {
        connection: ConnectionId,
        role: Role,
        code: PairingCode,
    },

    /// No display is currently registered under the code.
    #[error("no display registered under code {0}")]
    UnknownCode(PairingCode),
}

/// In-memory registry of live pairings.
#[derive(Debug)]
pub struct ConnectionRegistry<R = StdRng> {
    displays: HashMap<PairingCode, ConnectionId>,
    controllers: HashMap<PairingCode, ConnectionId>,
    associations: HashMap<ConnectionId, Association>,
    generator: CodeGenerator<R>,
}

impl ConnectionRegistry<StdRng> {
    /// Creates an empty registry whose codes come from the OS random source.
    pub fn new() -> Self {
        Self::with_generator(CodeGenerator::from_os_rng())
    }
}

impl Default for ConnectionRegistry<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ConnectionRegistry<R> {
    /// Creates an empty registry drawing codes from `generator`.
    pub fn with_generator(generator: CodeGenerator<R>) -> Self {
        Self {
            displays: HashMap::new(),
            controllers: HashMap::new(),
            associations: HashMap::new(),
            generator,
        }
    }

    /// Registers `connection` as a display under a freshly drawn code.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyAssociated`] if the connection still
    /// holds a code, or ever paired as a controller.
    pub fn register_display(
        &mut self,
        connection: ConnectionId,
    ) -> Result<PairingCode, RegistryError> {
        self.ensure_free_for(connection, Role::Display)?;

        let displays = &self.displays;
        let code = self.generator.generate(|c| displays.contains_key(&c));

        self.displays.insert(code, connection);
        self.associate(connection, Role::Display, code);
        debug!("registry: display {connection} registered under {code}");
        Ok(code)
    }

    /// Pairs `connection` as the controller of the display registered under
    /// `code`.
    ///
    /// A code holds at most one controller.  If another controller was
    /// already paired it is displaced and returned; its association is left
    /// in place but it no longer owns the code.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::AlreadyAssociated`] if the connection is still paired,
    ///   or ever registered as a display.
    /// - [`RegistryError::UnknownCode`] if no display holds `code`.
    ///
    /// Nothing is modified when an error is returned.
    pub fn pair_controller(
        &mut self,
        code: PairingCode,
        connection: ConnectionId,
    ) -> Result<Option<ConnectionId>, RegistryError> {
        self.ensure_free_for(connection, Role::Controller)?;
        if !self.displays.contains_key(&code) {
            return Err(RegistryError::UnknownCode(code));
        }

        let displaced = self.controllers.insert(code, connection);
        self.associate(connection, Role::Controller, code);
        debug!("registry: controller {connection} paired with {code}");
        Ok(displaced)
    }

    /// The display registered under `code`, if any.
    pub fn lookup_display(&self, code: PairingCode) -> Option<ConnectionId> {
        self.displays.get(&code).copied()
    }

    /// The controller paired with `code`, if any.
    pub fn lookup_controller(&self, code: PairingCode) -> Option<ConnectionId> {
        self.controllers.get(&code).copied()
    }

    /// Looks up the connection holding `role` at `code`.
    pub fn lookup(&self, code: PairingCode, role: Role) -> Option<ConnectionId> {
        match role {
            Role::Display => self.lookup_display(code),
            Role::Controller => self.lookup_controller(code),
        }
    }

    /// Removes the `role` entry at `code` and returns the connection it held.
    ///
    /// The other role's entry and all associations are untouched.
    pub fn release(&mut self, code: PairingCode, role: Role) -> Option<ConnectionId> {
        let released = match role {
            Role::Display => self.displays.remove(&code),
            Role::Controller => self.controllers.remove(&code),
        };
        if let Some(connection) = released {
            debug!("registry: released {role} {connection} at {code}");
        }
        released
    }

    /// The association recorded for `connection`, if it ever registered or
    /// paired.
    pub fn association(&self, connection: ConnectionId) -> Option<Association> {
        self.associations.get(&connection).copied()
    }

    /// Drops the association for `connection` and returns it.
    pub fn forget(&mut self, connection: ConnectionId) -> Option<Association> {
        self.associations.remove(&connection)
    }

    /// Whether `connection` still holds the table entry for its role and code.
    pub fn owns(&self, connection: ConnectionId) -> bool {
        self.association(connection)
            .map(|a| self.lookup(a.code, a.role) == Some(connection))
            .unwrap_or(false)
    }

    /// Whether a display is registered under `code`.
    pub fn is_registered(&self, code: PairingCode) -> bool {
        self.displays.contains_key(&code)
    }

    pub fn display_count(&self) -> usize {
        self.displays.len()
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn association_count(&self) -> usize {
        self.associations.len()
    }

    /// A stale association for the same role is overwritten by `associate`.
    fn ensure_free_for(&self, connection: ConnectionId, role: Role) -> Result<(), RegistryError> {
        match self.associations.get(&connection) {
            Some(a) if a.role != role || self.owns(connection) => {
                Err(RegistryError::AlreadyAssociated {
                    connection,
                    role: a.role,
                    code: a.code,
                })
            }
            _ => Ok(()),
        }
    }

    fn associate(&mut self, connection: ConnectionId, role: Role, code: PairingCode) {
        self.associations.insert(
            connection,
            Association {
                connection,
                role,
                code,
            },
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
