//! The broker task.
//!
//! A single Tokio task owns the [`Broker`] and drains a command channel, so
//! inbound occurrences from every session are applied one at a time in
//! arrival order.  Sessions talk to it only through a cloneable
//! [`BrokerHandle`].
//!
//! ```text
//! session A ──┐                          ┌──► outbox A ──► ws writer A
//! session B ──┼──► mpsc<BrokerCommand> ──► Broker ──► outbox B ──► ws writer B
//! session C ──┘                          └──► outbox C ──► ws writer C
//! ```
//!
//! Outboxes are bounded and written with `try_send`, so a slow client can
//! never stall the broker.

use rand::Rng;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pairing_core::{ClientEvent, ConnectionId, ServerEvent};

use crate::application::{Broker, BrokerStats, DeliveryError, EventSink};

// ── Commands ──────────────────────────────────────────────────────────────────

/// Messages accepted by the broker task.
#[derive(Debug)]
pub enum BrokerCommand {
    Connect {
        id: ConnectionId,
        outbox: mpsc::Sender<ServerEvent>,
    },
    Event {
        id: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        id: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<BrokerStats>,
    },
}

/// The broker task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("broker task is no longer running")]
pub struct BrokerGone;

impl EventSink for mpsc::Sender<ServerEvent> {
    fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable front end of the broker task.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    commands: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    pub async fn connect(
        &self,
        id: ConnectionId,
        outbox: mpsc::Sender<ServerEvent>,
    ) -> Result<(), BrokerGone> {
        self.send(BrokerCommand::Connect { id, outbox }).await
    }

    pub async fn event(&self, id: ConnectionId, event: ClientEvent) -> Result<(), BrokerGone> {
        self.send(BrokerCommand::Event { id, event }).await
    }

    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), BrokerGone> {
        self.send(BrokerCommand::Disconnect { id }).await
    }

    /// Snapshot of the broker's counters.
    pub async fn stats(&self) -> Result<BrokerStats, BrokerGone> {
        let (reply, rx) = oneshot::channel();
        self.send(BrokerCommand::Stats { reply }).await?;
        rx.await.map_err(|_| BrokerGone)
    }

    async fn send(&self, command: BrokerCommand) -> Result<(), BrokerGone> {
        self.commands.send(command).await.map_err(|_| BrokerGone)
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// Moves `broker` into a new task and returns its handle.
///
/// The task exits once every [`BrokerHandle`] clone has been dropped and the
/// queue is drained; its join value is the final statistics.
pub fn spawn_broker<R>(broker: Broker<R>, buffer: usize) -> (BrokerHandle, JoinHandle<BrokerStats>)
where
    R: Rng + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer);
    let task = tokio::spawn(run_broker(broker, rx));
    (BrokerHandle { commands: tx }, task)
}

async fn run_broker<R: Rng>(
    mut broker: Broker<R>,
    mut commands: mpsc::Receiver<BrokerCommand>,
) -> BrokerStats {
    info!("broker task started ({} teardown policy)", broker.policy());
    while let Some(command) = commands.recv().await {
        match command {
            BrokerCommand::Connect { id, outbox } => broker.connect(id, Box::new(outbox)),
            BrokerCommand::Event { id, event } => broker.handle(id, event),
            BrokerCommand::Disconnect { id } => broker.disconnect(id),
            BrokerCommand::Stats { reply } => {
                if reply.send(broker.stats()).is_err() {
                    debug!("broker: stats requester went away");
                }
            }
        }
    }
    info!("broker task stopped");
    broker.stats()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
