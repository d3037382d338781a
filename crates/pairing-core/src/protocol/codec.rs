//! JSON envelope codec and event-name vocabulary.
//!
//! Every WebSocket text frame carries one envelope:
//!
//! ```json
//! {"event":"connect-to-display","data":"482913"}
//! ```
//!
//! `data` may be omitted for events without a payload.
//!
//! # Display label
//!
//! The four role-bearing event names are built from a configurable label for
//! the display role, so one broker can serve clients written against
//! different vocabularies:
//!
//! | label     | register          | reply                 | join                 | join reply              |
//! |-----------|-------------------|-----------------------|----------------------|-------------------------|
//! | `display` | `register-display`| `display-registered`  | `connect-to-display` | `connected-to-display`  |
//! | `tv`      | `register-tv`     | `tv-registered`       | `connect-to-tv`      | `connected-to-tv`       |
//!
//! The relay events (`login-result`, `send-credentials`, `broadcast-test` and
//! their outbound forms) are the same under every label.  The diagnostic echo
//! goes out under whichever of its two names it came in with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::messages::{BroadcastName, ClientEvent, ServerEvent};

/// Label used when none is configured.
pub const DEFAULT_DISPLAY_LABEL: &str = "display";

pub const LOGIN_RESULT: &str = "login-result";
pub const LOGIN_RESULT_CLIENT: &str = "login-result-client";
pub const SEND_CREDENTIALS: &str = "send-credentials";
pub const RECEIVE_CREDENTIALS: &str = "receive-credentials";
pub const BROADCAST_TEST: &str = "broadcast-test";

/// Older clients name the diagnostic echo `simple-test`.
pub const BROADCAST_TEST_ALIAS: &str = "simple-test";

/// Errors that can occur while decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object with an `event` string.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope names an event this broker does not accept.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// The event-name vocabulary for one display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames {
    label: String,
    register: String,
    registered: String,
    connect: String,
    connected: String,
}

impl EventNames {
    /// Builds the vocabulary for `display_label`.
    ///
    /// The label is used verbatim; validation happens where the label is
    /// configured.
    pub fn new(display_label: &str) -> Self {
        Self {
            label: display_label.to_string(),
            register: format!("register-{display_label}"),
            registered: format!("{display_label}-registered"),
            connect: format!("connect-to-{display_label}"),
            connected: format!("connected-to-{display_label}"),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Name of the inbound registration event.
    pub fn register(&self) -> &str {
        &self.register
    }

    /// Name of the inbound pairing event.
    pub fn connect(&self) -> &str {
        &self.connect
    }

    /// Parses a text frame into a [`ClientEvent`].
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Json`] for anything that is not an envelope, and
    /// [`ProtocolError::UnknownEvent`] for an unrecognised event name.
    pub fn decode(&self, frame: &str) -> Result<ClientEvent, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        self.decode_envelope(envelope)
    }

    /// Maps an already-parsed envelope onto a [`ClientEvent`].
    pub fn decode_envelope(&self, envelope: Envelope) -> Result<ClientEvent, ProtocolError> {
        let Envelope { event, data } = envelope;
        let decoded = if event == self.register {
            ClientEvent::RegisterDisplay
        } else if event == self.connect {
            ClientEvent::ConnectToDisplay {
                code: code_text(data),
            }
        } else {
            match event.as_str() {
                LOGIN_RESULT => ClientEvent::LoginResult(data),
                SEND_CREDENTIALS => ClientEvent::SendCredentials(data),
                BROADCAST_TEST => ClientEvent::BroadcastTest {
                    name: BroadcastName::BroadcastTest,
                    data,
                },
                BROADCAST_TEST_ALIAS => ClientEvent::BroadcastTest {
                    name: BroadcastName::SimpleTest,
                    data,
                },
                _ => return Err(ProtocolError::UnknownEvent(event)),
            }
        };
        Ok(decoded)
    }

    /// Wraps a [`ServerEvent`] in its envelope.
    pub fn to_envelope(&self, event: &ServerEvent) -> Envelope {
        let (name, data) = match event {
            ServerEvent::DisplayRegistered(code) => {
                (self.registered.clone(), Value::String(code.to_string()))
            }
            ServerEvent::ConnectedToDisplay(ok) => (self.connected.clone(), Value::Bool(*ok)),
            ServerEvent::LoginResultClient(v) => (LOGIN_RESULT_CLIENT.to_string(), v.clone()),
            ServerEvent::ReceiveCredentials(v) => (RECEIVE_CREDENTIALS.to_string(), v.clone()),
            ServerEvent::BroadcastTest { name, data } => {
                (broadcast_event_name(*name).to_string(), data.clone())
            }
        };
        Envelope { event: name, data }
    }

    /// Serializes a [`ServerEvent`] into a text frame.
    pub fn encode(&self, event: &ServerEvent) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&self.to_envelope(event))?)
    }
}

impl Default for EventNames {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_LABEL)
    }
}

fn broadcast_event_name(name: BroadcastName) -> &'static str {
    match name {
        BroadcastName::BroadcastTest => BROADCAST_TEST,
        BroadcastName::SimpleTest => BROADCAST_TEST_ALIAS,
    }
}

/// Controllers send the code as a string, but a bare JSON number is taken
/// too.  Anything else becomes text that will fail code validation.
fn code_text(data: Value) -> String {
    match data {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
