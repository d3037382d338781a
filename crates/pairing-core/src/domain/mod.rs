//! Domain layer: pairing codes, connection identities, and the registry.
//!
//! Nothing in here performs I/O.  The registry is a plain data structure that
//! must be driven by a single owner (the relay's broker task), which is what
//! makes each of its operations atomic from the caller's point of view.

pub mod code;
pub mod connection;
pub mod registry;
