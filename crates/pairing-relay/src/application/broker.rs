//! The pairing broker.
//!
//! [`Broker`] owns the connection registry and one outbound [`EventSink`] per
//! live connection.  Every inbound occurrence (connect, client event,
//! disconnect) is a method call that runs to completion before the next one,
//! so the registry never observes a half-applied update.  The infrastructure
//! layer gives the broker to a single task and feeds it through a channel.
//!
//! Delivery is fire-and-forget: a sink that refuses an event (full or closed)
//! is logged and counted, never retried, and never fails the caller.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use pairing_core::{
    ClientEvent, ConnectionId, ConnectionRegistry, PairingCode, RegistryError, ServerEvent,
};

use crate::application::lifecycle::teardown;
use crate::application::router::{route, RelayEvent, Route};
use crate::domain::TeardownPolicy;

// ── Outbound seam ─────────────────────────────────────────────────────────────

/// Why an event could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
}

/// Outbound half of a connection as seen by the broker.
///
/// Implementations must not block; the broker calls `deliver` from its only
/// task.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send {
    fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError>;
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Running counters, all monotonic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Connections ever attached.
    pub connections: u64,
    /// Successful display registrations.
    pub registrations: u64,
    pub pairings_ok: u64,
    /// Pairing attempts answered with `false`.
    pub pairings_failed: u64,
    /// Events forwarded 1:1 to a peer.
    pub relayed: u64,
    /// Relay events from a paired source whose peer was missing.
    pub dropped_no_peer: u64,
    /// Relay events from an unpaired source or one holding the wrong role.
    pub dropped_unpaired: u64,
    pub broadcasts: u64,
    /// Individual deliveries refused by a sink.
    pub delivery_failures: u64,
}

// ── Broker ────────────────────────────────────────────────────────────────────

/// Pairs displays with controllers and relays events between them.
pub struct Broker<R = StdRng> {
    registry: ConnectionRegistry<R>,
    sinks: HashMap<ConnectionId, Box<dyn EventSink>>,
    policy: TeardownPolicy,
    stats: BrokerStats,
}

impl Broker<StdRng> {
    /// Creates a broker with an OS-seeded code generator.
    pub fn new(policy: TeardownPolicy) -> Self {
        Self::with_registry(ConnectionRegistry::new(), policy)
    }
}

impl<R: Rng> Broker<R> {
    pub fn with_registry(registry: ConnectionRegistry<R>, policy: TeardownPolicy) -> Self {
        Self {
            registry,
            sinks: HashMap::new(),
            policy,
            stats: BrokerStats::default(),
        }
    }

    /// Attaches a new connection and its outbound sink.
    ///
    /// Re-attaching an existing id replaces its sink.
    pub fn connect(&mut self, id: ConnectionId, sink: Box<dyn EventSink>) {
        if self.sinks.insert(id, sink).is_some() {
            warn!("broker: connection {id} attached twice; sink replaced");
        } else {
            self.stats.connections += 1;
            debug!("broker: connection {id} attached ({} live)", self.sinks.len());
        }
    }

    /// Handles one event received from `id`.
    pub fn handle(&mut self, id: ConnectionId, event: ClientEvent) {
        debug!("broker: {} from {id}", event.kind());
        match event {
            ClientEvent::RegisterDisplay => self.register_display(id),
            ClientEvent::ConnectToDisplay { code } => self.connect_to_display(id, &code),
            ClientEvent::LoginResult(payload) => self.relay(id, RelayEvent::LoginResult(payload)),
            ClientEvent::SendCredentials(payload) => {
                self.relay(id, RelayEvent::SendCredentials(payload))
            }
            ClientEvent::BroadcastTest { name, data } => {
                self.relay(id, RelayEvent::BroadcastTest { name, data })
            }
        }
    }

    /// Detaches `id` and purges its registry state.
    pub fn disconnect(&mut self, id: ConnectionId) {
        self.sinks.remove(&id);
        let result = teardown(&mut self.registry, id, self.policy);
        match result.association {
            Some(association) if result.released_any() => info!(
                "broker: {} {id} left; pairing {} released ({} policy)",
                association.role, association.code, self.policy
            ),
            Some(association) => debug!(
                "broker: {} {id} left; {} no longer held by it",
                association.role, association.code
            ),
            None => debug!("broker: unpaired connection {id} left"),
        }
    }

    pub fn stats(&self) -> BrokerStats {
        self.stats
    }

    pub fn registry(&self) -> &ConnectionRegistry<R> {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn policy(&self) -> TeardownPolicy {
        self.policy
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    fn register_display(&mut self, id: ConnectionId) {
        match self.registry.register_display(id) {
            Ok(code) => {
                self.stats.registrations += 1;
                info!("broker: display {id} registered with code {code}");
                self.send(id, ServerEvent::DisplayRegistered(code));
            }
            Err(e) => warn!("broker: registration from {id} refused: {e}"),
        }
    }

    fn connect_to_display(&mut self, id: ConnectionId, code: &str) {
        let paired = match code.parse::<PairingCode>() {
            Ok(code) => self.pair(id, code),
            Err(e) => {
                debug!("broker: {id} sent malformed code: {e}");
                false
            }
        };
        if paired {
            self.stats.pairings_ok += 1;
        } else {
            self.stats.pairings_failed += 1;
        }
        self.send(id, ServerEvent::ConnectedToDisplay(paired));
    }

    fn pair(&mut self, id: ConnectionId, code: PairingCode) -> bool {
        match self.registry.pair_controller(code, id) {
            Ok(displaced) => {
                if let Some(old) = displaced {
                    info!("broker: controller {old} displaced from {code} by {id}");
                }
                info!("broker: controller {id} paired with {code}");
                true
            }
            Err(e @ RegistryError::UnknownCode(_)) => {
                debug!("broker: pairing from {id} failed: {e}");
                false
            }
            Err(e) => {
                warn!("broker: pairing from {id} refused: {e}");
                false
            }
        }
    }

    fn relay(&mut self, id: ConnectionId, event: RelayEvent) {
        match route(&self.registry, id, event) {
            Route::Unicast { to, event } => {
                debug!("broker: relaying {} {id} -> {to}", event.kind());
                self.stats.relayed += 1;
                self.send(to, event);
            }
            Route::Broadcast(event) => {
                self.stats.broadcasts += 1;
                debug!(
                    "broker: broadcasting {} from {id} to {} connections",
                    event.kind(),
                    self.sinks.len()
                );
                let mut failures = 0;
                for (to, sink) in &self.sinks {
                    if let Err(e) = sink.deliver(event.clone()) {
                        warn!("broker: dropped {} for {to}: {e}", event.kind());
                        failures += 1;
                    }
                }
                self.stats.delivery_failures += failures;
            }
            Route::Drop(reason) => {
                if reason.is_peer_missing() {
                    self.stats.dropped_no_peer += 1;
                    debug!("broker: event from {id} dropped: {reason}");
                } else {
                    self.stats.dropped_unpaired += 1;
                    warn!("broker: event from {id} dropped: {reason}");
                }
            }
        }
    }

    fn send(&mut self, to: ConnectionId, event: ServerEvent) {
        let Some(sink) = self.sinks.get(&to) else {
            debug!("broker: {} for detached {to} discarded", event.kind());
            self.stats.delivery_failures += 1;
            return;
        };
        let kind = event.kind();
        if let Err(e) = sink.deliver(event) {
            warn!("broker: dropped {kind} for {to}: {e}");
            self.stats.delivery_failures += 1;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use pairing_core::{BroadcastName, CodeGenerator};
    use serde_json::json;

    /// Sink that records everything it receives.
    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<ServerEvent>>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<ServerEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl EventSink for RecordingSink {
        fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn broker(policy: TeardownPolicy) -> Broker {
        Broker::with_registry(
            ConnectionRegistry::with_generator(CodeGenerator::seeded(5)),
            policy,
        )
    }

    fn attach(broker: &mut Broker) -> (ConnectionId, RecordingSink) {
        let id = ConnectionId::new();
        let sink = RecordingSink::default();
        broker.connect(id, Box::new(sink.clone()));
        (id, sink)
    }

    fn registered_code(sink: &RecordingSink) -> PairingCode {
        match sink.take().as_slice() {
            [ServerEvent::DisplayRegistered(code)] => *code,
            other => panic!("expected a single registration reply, got {other:?}"),
        }
    }

    /// Display and controller attached, registered and paired; sinks drained.
    fn paired(
        broker: &mut Broker,
    ) -> (ConnectionId, RecordingSink, ConnectionId, RecordingSink, PairingCode) {
        let (display, display_sink) = attach(broker);
        let (controller, controller_sink) = attach(broker);
        broker.handle(display, ClientEvent::RegisterDisplay);
        let code = registered_code(&display_sink);
        broker.handle(
            controller,
            ClientEvent::ConnectToDisplay {
                code: code.to_string(),
            },
        );
        assert_eq!(controller_sink.take(), vec![ServerEvent::ConnectedToDisplay(true)]);
        (display, display_sink, controller, controller_sink, code)
    }

    #[test]
    fn test_register_replies_with_code() {
        // Arrange
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, sink) = attach(&mut broker);

        // Act
        broker.handle(display, ClientEvent::RegisterDisplay);

        // Assert
        let code = registered_code(&sink);
        assert_eq!(broker.registry().lookup_display(code), Some(display));
        assert_eq!(broker.stats().registrations, 1);
    }

    #[test]
    fn test_second_registration_is_refused_silently() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, sink) = attach(&mut broker);
        broker.handle(display, ClientEvent::RegisterDisplay);
        let _ = sink.take();

        broker.handle(display, ClientEvent::RegisterDisplay);

        assert!(sink.take().is_empty());
        assert_eq!(broker.registry().display_count(), 1);
        assert_eq!(broker.stats().registrations, 1);
    }

    #[test]
    fn test_display_reregisters_after_controller_leaves() {
        // Arrange: the default policy releases the display's code too.
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, display_sink, controller, _, old) = paired(&mut broker);
        broker.disconnect(controller);

        // Act
        broker.handle(display, ClientEvent::RegisterDisplay);

        // Assert
        let code = registered_code(&display_sink);
        assert_eq!(broker.registry().lookup_display(code), Some(display));
        assert!(old == code || !broker.registry().is_registered(old));
        assert_eq!(broker.stats().registrations, 2);

        let (next, next_sink) = attach(&mut broker);
        broker.handle(
            next,
            ClientEvent::ConnectToDisplay {
                code: code.to_string(),
            },
        );
        broker.handle(display, ClientEvent::LoginResult(json!({"ok": true})));
        assert_eq!(
            next_sink.take(),
            vec![
                ServerEvent::ConnectedToDisplay(true),
                ServerEvent::LoginResultClient(json!({"ok": true})),
            ]
        );
    }

    #[test]
    fn test_controller_pairs_elsewhere_after_display_leaves() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, _, controller, controller_sink, _) = paired(&mut broker);
        broker.disconnect(display);
        let (other, other_sink) = attach(&mut broker);
        broker.handle(other, ClientEvent::RegisterDisplay);
        let code = registered_code(&other_sink);

        broker.handle(
            controller,
            ClientEvent::ConnectToDisplay {
                code: code.to_string(),
            },
        );
        broker.handle(controller, ClientEvent::SendCredentials(json!("c")));

        assert_eq!(controller_sink.take(), vec![ServerEvent::ConnectedToDisplay(true)]);
        assert_eq!(other_sink.take(), vec![ServerEvent::ReceiveCredentials(json!("c"))]);
    }

    #[test]
    fn test_connect_to_unknown_code_replies_false() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (controller, sink) = attach(&mut broker);

        broker.handle(
            controller,
            ClientEvent::ConnectToDisplay {
                code: "000000".to_string(),
            },
        );

        assert_eq!(sink.take(), vec![ServerEvent::ConnectedToDisplay(false)]);
        assert_eq!(broker.registry().controller_count(), 0);
        assert_eq!(broker.stats().pairings_failed, 1);
    }

    #[test]
    fn test_connect_with_malformed_code_replies_false() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (controller, sink) = attach(&mut broker);

        for code in ["", "12345", "abcdef", "1234567"] {
            broker.handle(
                controller,
                ClientEvent::ConnectToDisplay {
                    code: code.to_string(),
                },
            );
        }

        assert_eq!(sink.take(), vec![ServerEvent::ConnectedToDisplay(false); 4]);
        assert_eq!(broker.registry().association(controller), None);
    }

    #[test]
    fn test_display_cannot_pair_as_controller() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, sink) = attach(&mut broker);
        broker.handle(display, ClientEvent::RegisterDisplay);
        let code = registered_code(&sink);

        broker.handle(
            display,
            ClientEvent::ConnectToDisplay {
                code: code.to_string(),
            },
        );

        assert_eq!(sink.take(), vec![ServerEvent::ConnectedToDisplay(false)]);
        assert_eq!(broker.registry().lookup_controller(code), None);
    }

    #[test]
    fn test_credentials_and_login_result_are_relayed() {
        // Arrange
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, display_sink, controller, controller_sink, _) = paired(&mut broker);
        let creds = json!({"user": "a", "pass": "b"});
        let result = json!({"ok": true});

        // Act
        broker.handle(controller, ClientEvent::SendCredentials(creds.clone()));
        broker.handle(display, ClientEvent::LoginResult(result.clone()));

        // Assert
        assert_eq!(display_sink.take(), vec![ServerEvent::ReceiveCredentials(creds)]);
        assert_eq!(controller_sink.take(), vec![ServerEvent::LoginResultClient(result)]);
        assert_eq!(broker.stats().relayed, 2);
    }

    #[test]
    fn test_login_result_without_controller_is_noop() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, sink) = attach(&mut broker);
        broker.handle(display, ClientEvent::RegisterDisplay);
        let _ = registered_code(&sink);

        broker.handle(display, ClientEvent::LoginResult(json!({"ok": false})));

        assert!(sink.take().is_empty());
        assert_eq!(broker.stats().dropped_no_peer, 1);
    }

    #[test]
    fn test_unpaired_sender_is_dropped() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (_display, display_sink, _, _, _) = paired(&mut broker);
        let (stranger, stranger_sink) = attach(&mut broker);

        broker.handle(stranger, ClientEvent::SendCredentials(json!({"user": "x"})));

        assert!(display_sink.take().is_empty());
        assert!(stranger_sink.take().is_empty());
        assert_eq!(broker.stats().dropped_unpaired, 1);
    }

    #[test]
    fn test_send_credentials_after_display_disconnect_is_noop() {
        // Arrange
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, display_sink, controller, controller_sink, code) = paired(&mut broker);

        // Act
        broker.disconnect(display);
        broker.handle(controller, ClientEvent::SendCredentials(json!({"user": "a"})));

        // Assert
        assert!(display_sink.take().is_empty());
        assert!(controller_sink.take().is_empty());
        assert_eq!(broker.registry().lookup_display(code), None);
        assert_eq!(broker.registry().lookup_controller(code), None);
        assert_eq!(broker.stats().dropped_no_peer, 1);
    }

    #[test]
    fn test_controller_disconnect_releases_pairing_by_default() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, display_sink, controller, _, code) = paired(&mut broker);

        broker.disconnect(controller);
        broker.handle(display, ClientEvent::LoginResult(json!({})));

        assert!(!broker.registry().is_registered(code));
        assert!(display_sink.take().is_empty());
    }

    #[test]
    fn test_role_policy_allows_repairing_after_controller_leaves() {
        // Arrange
        let mut broker = broker(TeardownPolicy::Role);
        let (display, display_sink, controller, _, code) = paired(&mut broker);
        broker.disconnect(controller);
        let (next, next_sink) = attach(&mut broker);

        // Act
        broker.handle(
            next,
            ClientEvent::ConnectToDisplay {
                code: code.to_string(),
            },
        );
        broker.handle(display, ClientEvent::LoginResult(json!({"ok": true})));

        // Assert
        assert_eq!(
            next_sink.take(),
            vec![
                ServerEvent::ConnectedToDisplay(true),
                ServerEvent::LoginResultClient(json!({"ok": true})),
            ]
        );
        assert!(display_sink.take().is_empty());
    }

    #[test]
    fn test_latest_controller_wins() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, display_sink, first, first_sink, code) = paired(&mut broker);
        let (second, second_sink) = attach(&mut broker);
        broker.handle(
            second,
            ClientEvent::ConnectToDisplay {
                code: code.to_string(),
            },
        );
        let _ = second_sink.take();

        broker.handle(display, ClientEvent::LoginResult(json!(1)));
        broker.handle(first, ClientEvent::SendCredentials(json!("old")));
        broker.disconnect(first);
        broker.handle(second, ClientEvent::SendCredentials(json!("new")));

        assert!(first_sink.take().is_empty());
        assert_eq!(second_sink.take(), vec![ServerEvent::LoginResultClient(json!(1))]);
        assert_eq!(display_sink.take(), vec![ServerEvent::ReceiveCredentials(json!("new"))]);
    }

    #[test]
    fn test_broadcast_reaches_every_connection_once() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (display, display_sink, _, controller_sink, _) = paired(&mut broker);
        let (_, bystander_sink) = attach(&mut broker);

        broker.handle(
            display,
            ClientEvent::BroadcastTest {
                name: BroadcastName::BroadcastTest,
                data: json!("hello"),
            },
        );

        let expected = vec![ServerEvent::BroadcastTest {
            name: BroadcastName::BroadcastTest,
            data: json!("hello"),
        }];
        assert_eq!(display_sink.take(), expected);
        assert_eq!(controller_sink.take(), expected);
        assert_eq!(bystander_sink.take(), expected);
        assert_eq!(broker.stats().broadcasts, 1);
    }

    #[test]
    fn test_disconnected_connection_receives_no_broadcast() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let (a, _) = attach(&mut broker);
        let (b, b_sink) = attach(&mut broker);
        broker.disconnect(b);

        broker.handle(
            a,
            ClientEvent::BroadcastTest {
                name: BroadcastName::SimpleTest,
                data: json!(null),
            },
        );

        assert!(b_sink.take().is_empty());
        assert_eq!(broker.connection_count(), 1);
    }

    #[test]
    fn test_failed_delivery_is_counted_not_fatal() {
        // Arrange: a sink whose queue is always full.
        let mut broker = broker(TeardownPolicy::Pairing);
        let mut full = MockEventSink::new();
        full.expect_deliver()
            .times(1)
            .returning(|_| Err(DeliveryError::Full));
        let display = ConnectionId::new();
        broker.connect(display, Box::new(full));

        // Act
        broker.handle(display, ClientEvent::RegisterDisplay);

        // Assert: the registration itself still happened.
        assert_eq!(broker.registry().display_count(), 1);
        assert_eq!(broker.stats().delivery_failures, 1);
    }

    #[test]
    fn test_mock_sink_receives_exact_reply() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let mut sink = MockEventSink::new();
        sink.expect_deliver()
            .withf(|event| *event == ServerEvent::ConnectedToDisplay(false))
            .times(1)
            .returning(|_| Ok(()));
        let controller = ConnectionId::new();
        broker.connect(controller, Box::new(sink));

        broker.handle(
            controller,
            ClientEvent::ConnectToDisplay {
                code: "999999".to_string(),
            },
        );
    }

    #[test]
    fn test_connections_counter_ignores_reattach() {
        let mut broker = broker(TeardownPolicy::Pairing);
        let id = ConnectionId::new();
        broker.connect(id, Box::new(RecordingSink::default()));
        broker.connect(id, Box::new(RecordingSink::default()));
        assert_eq!(broker.stats().connections, 1);
        assert_eq!(broker.connection_count(), 1);
    }
}
