//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Spawning the broker task that owns all pairing state.
//! 3. Upgrading each accepted connection to a WebSocket session.
//! 4. Running two concurrent tasks per session:
//!    - **Reader**: decodes JSON text frames and forwards them to the broker.
//!    - **Writer**: drains the session's outbox and sends JSON text frames.
//! 5. Reporting the session's end to the broker so its pairing is released.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! Sessions never touch the registry; they only exchange commands and events
//! with the broker task.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use pairing_core::{ConnectionId, EventNames, ServerEvent};

use crate::application::Broker;
use crate::domain::RelayConfig;
use crate::infrastructure::broker_task::{spawn_broker, BrokerHandle};

/// How often the accept loop re-checks the shutdown flag when idle.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind port 443).
pub async fn run_server(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    serve(listener, config, running).await
}

/// Serves WebSocket sessions on an already bound `listener`.
///
/// `config.bind_addr` is ignored; tests bind `127.0.0.1:0` themselves and
/// read the port back from the listener.
pub async fn serve(
    listener: TcpListener,
    config: RelayConfig,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(
        "pairing relay listening on {local_addr} (label '{}', {} teardown)",
        config.display_label, config.teardown_policy
    );

    let broker = Broker::new(config.teardown_policy);
    // Live sessions hold handle clones, so the broker task may outlive this
    // function; it stops once the last session ends.
    let (broker, _broker_task) = spawn_broker(broker, config.command_buffer);
    let names = Arc::new(EventNames::new(&config.display_label));
    let outbound_buffer = config.outbound_buffer;

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A bare `accept()` would block until the next client arrives and
        // never see the shutdown flag.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let broker = broker.clone();
                let names = Arc::clone(&names);
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, broker, names, outbound_buffer).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. file descriptor exhaustion); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection in the last poll interval.
            }
        }
    }

    match broker.stats().await {
        Ok(stats) => info!("broker statistics at shutdown: {stats:?}"),
        Err(e) => warn!("could not collect broker statistics: {e}"),
    }
    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    broker: BrokerHandle,
    names: Arc<EventNames>,
    outbound_buffer: usize,
) {
    match run_session(stream, peer_addr, broker, names, outbound_buffer).await {
        Ok(()) => debug!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs one WebSocket session from handshake to disconnect.
///
/// # Errors
///
/// Returns an error if the handshake fails or the broker task is gone.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    broker: BrokerHandle,
    names: Arc<EventNames>,
    outbound_buffer: usize,
) -> anyhow::Result<()> {
    // ── Step 1: Complete the WebSocket handshake ─────────────────────────────
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let id = ConnectionId::new();
    info!("session {id} established from {peer_addr}");

    // ── Step 2: Split the stream and attach to the broker ────────────────────
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<ServerEvent>(outbound_buffer);
    broker
        .connect(id, outbox_tx)
        .await
        .with_context(|| format!("session {id}: broker unavailable"))?;

    // ── Step 3: Writer, outbox → WebSocket ───────────────────────────────────
    let writer_names = Arc::clone(&names);
    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbox_rx.recv().await {
            let text = match writer_names.encode(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("session {id}: failed to encode {}: {e}", event.kind());
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!("session {id}: WebSocket send failed (peer gone)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Step 4: Reader, WebSocket → broker ───────────────────────────────────
    let reader_broker = broker.clone();
    let mut reader = tokio::spawn(async move {
        loop {
            let frame = match ws_rx.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("session {id}: WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {id}: WebSocket error: {e}");
                    break;
                }
                None => {
                    debug!("session {id}: stream ended");
                    break;
                }
            };

            match frame {
                WsMessage::Text(text) => {
                    let event = match names.decode(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            // One bad frame does not end the session.
                            warn!("session {id}: ignoring frame: {e}");
                            continue;
                        }
                    };
                    debug!("session {id}: received {}", event.kind());
                    if reader_broker.event(id, event).await.is_err() {
                        warn!("session {id}: broker stopped");
                        break;
                    }
                }
                WsMessage::Binary(_) => {
                    warn!("session {id}: unexpected binary frame (ignored)");
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                WsMessage::Close(_) => {
                    debug!("session {id}: close frame received");
                    break;
                }
            }
        }
    });

    // ── Step 5: Wait for either half to finish ───────────────────────────────
    let writer_done = tokio::select! {
        _ = &mut reader => {
            debug!("session {id}: reader ended");
            false
        }
        _ = &mut writer => {
            debug!("session {id}: writer ended");
            true
        }
    };
    reader.abort();

    // ── Step 6: Release the pairing ──────────────────────────────────────────
    if broker.disconnect(id).await.is_err() {
        warn!("session {id}: broker stopped before disconnect");
    }
    // The broker dropped the outbox sender, so the writer drains and exits.
    if !writer_done {
        let _ = writer.await;
    }

    info!("session {id} from {peer_addr} ended");
    Ok(())
}
