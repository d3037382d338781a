//! Connection teardown.
//!
//! When a connection terminates, its association is dropped and, if it still
//! owns its code, registry entries are released according to the configured
//! [`TeardownPolicy`]:
//!
//! | policy    | display leaves         | controller leaves        |
//! |-----------|------------------------|--------------------------|
//! | `Pairing` | display + controller   | display + controller     |
//! | `Role`    | display + controller   | controller only          |
//!
//! A display leaving always takes the controller entry with it.  Otherwise the
//! orphaned controller would be bound to whichever display next draws the same
//! code.
//!
//! A connection that no longer owns its code (its peer already tore the
//! pairing down, or a newer controller replaced it) releases nothing, so it
//! cannot destroy somebody else's pairing.

use rand::Rng;

use pairing_core::{Association, ConnectionId, ConnectionRegistry, Role};

use crate::domain::TeardownPolicy;

/// What a teardown removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Teardown {
    /// The terminated connection's association, if it had one.
    pub association: Option<Association>,
    /// Display entry released at the association's code.
    pub released_display: Option<ConnectionId>,
    /// Controller entry released at the association's code.
    pub released_controller: Option<ConnectionId>,
}

impl Teardown {
    /// Whether any registry entry was removed.
    pub fn released_any(&self) -> bool {
        self.released_display.is_some() || self.released_controller.is_some()
    }
}

/// Purges the registry state of a terminated connection.
pub fn teardown<R: Rng>(
    registry: &mut ConnectionRegistry<R>,
    connection: ConnectionId,
    policy: TeardownPolicy,
) -> Teardown {
    let owned = registry.owns(connection);
    let Some(association) = registry.forget(connection) else {
        return Teardown::default();
    };

    let mut result = Teardown {
        association: Some(association),
        ..Teardown::default()
    };
    if !owned {
        return result;
    }

    let code = association.code;
    match (policy, association.role) {
        (TeardownPolicy::Role, Role::Controller) => {
            result.released_controller = registry.release(code, Role::Controller);
        }
        _ => {
            result.released_display = registry.release(code, Role::Display);
            result.released_controller = registry.release(code, Role::Controller);
        }
    }
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────
