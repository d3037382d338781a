//! Typed events exchanged between clients and the broker.
//!
//! # Why separate inbound and outbound types?
//!
//! Clients and broker speak different halves of the protocol.  A controller
//! *sends* `send-credentials`; the display *receives* `receive-credentials`.
//! Two enums make it a compile-time error to hand a client-only event to a
//! client, and vice versa.
//!
//! Application payloads are [`serde_json::Value`]s.  The broker forwards them
//! byte-for-byte equivalent and never looks inside.

use serde_json::Value;

use crate::domain::code::PairingCode;

/// Events a client sends to the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A display asks for a pairing code.
    RegisterDisplay,

    /// A controller asks to join the display showing `code`.
    ///
    /// The code is kept as the raw text the client sent; the broker validates
    /// it so that a malformed code gets the same negative answer as an unknown
    /// one.
    ConnectToDisplay { code: String },

    /// A display reports the outcome of a login attempt to its controller.
    LoginResult(Value),

    /// A controller hands credentials to its display.
    SendCredentials(Value),

    /// Diagnostic echo, delivered to every connection under the same name.
    BroadcastTest { name: BroadcastName, data: Value },
}

/// Spelling of the diagnostic echo a client used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BroadcastName {
    /// `broadcast-test`.
    #[default]
    BroadcastTest,
    /// `simple-test`, used by older clients.
    SimpleTest,
}

impl ClientEvent {
    /// Short variant name for log lines.
    ///
    /// Logging the name instead of `{:?}` keeps credentials out of the logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::RegisterDisplay => "RegisterDisplay",
            ClientEvent::ConnectToDisplay { .. } => "ConnectToDisplay",
            ClientEvent::LoginResult(_) => "LoginResult",
            ClientEvent::SendCredentials(_) => "SendCredentials",
            ClientEvent::BroadcastTest { .. } => "BroadcastTest",
        }
    }
}

/// Events the broker sends to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Reply to [`ClientEvent::RegisterDisplay`].
    DisplayRegistered(PairingCode),

    /// Reply to [`ClientEvent::ConnectToDisplay`].
    ConnectedToDisplay(bool),

    /// A [`ClientEvent::LoginResult`] relayed to the paired controller.
    LoginResultClient(Value),

    /// A [`ClientEvent::SendCredentials`] relayed to the paired display.
    ReceiveCredentials(Value),

    /// A [`ClientEvent::BroadcastTest`] fanned out to every connection.
    BroadcastTest { name: BroadcastName, data: Value },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::DisplayRegistered(_) => "DisplayRegistered",
            ServerEvent::ConnectedToDisplay(_) => "ConnectedToDisplay",
            ServerEvent::LoginResultClient(_) => "LoginResultClient",
            ServerEvent::ReceiveCredentials(_) => "ReceiveCredentials",
            ServerEvent::BroadcastTest { .. } => "BroadcastTest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_kind_does_not_expose_payload() {
        let event = ClientEvent::SendCredentials(json!({"user": "a", "pass": "secret!"}));
        let kind = event.kind();
        assert_eq!(kind, "SendCredentials");
        assert!(!kind.contains("secret"));
    }

    #[test]
    fn test_server_kind_names() {
        assert_eq!(ServerEvent::ConnectedToDisplay(true).kind(), "ConnectedToDisplay");
        assert_eq!(
            ServerEvent::DisplayRegistered("123456".parse().unwrap()).kind(),
            "DisplayRegistered"
        );
    }
}
