use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::config::WsConfig;
use crate::ws::connection::{CloseReason, ConnectionHandle};
use crate::ws::hub::Hub;
use crate::ws::protocol;
use crate::ws::Identity;

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, drains the outbox and sends liveness pings
/// - Reader loop (this task): enforces the idle deadline, answers `ping`
///   envelopes, watches for eviction
///
/// The two halves only talk through the connection's outbox and its
/// shutdown signal. Whichever side notices a failure first triggers the
/// shutdown; the reader then unregisters and the socket is dropped once.
pub async fn run_connection(socket: WebSocket, hub: Hub, identity: Identity, settings: WsConfig) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (conn, outbox_rx) = ConnectionHandle::new(identity.clone(), settings.outbox_capacity);
    let connection_id = conn.id();

    if let Err(e) = hub.register(conn.clone()).await {
        tracing::error!(user_id = %identity, error = %e, "Could not register connection");
        return;
    }

    tracing::info!(
        user_id = %identity,
        connection_id = %connection_id,
        "WebSocket actor started"
    );

    let mut writer_handle = tokio::spawn(writer_task(ws_sender, outbox_rx, conn.clone(), settings.clone()));

    let mut shutdown = conn.shutdown_signal();
    let read_timeout = settings.read_timeout();

    // Reader loop: every read gets a fresh idle deadline
    loop {
        if *shutdown.borrow_and_update() {
            tracing::info!(
                user_id = %identity,
                reason = conn.close_reason().as_str(),
                "Connection shut down"
            );
            break;
        }

        let next = tokio::select! {
            _ = shutdown.changed() => continue,
            next = timeout(read_timeout, ws_receiver.next()) => next,
        };

        match next {
            Ok(Some(Ok(msg))) => match msg {
                Message::Text(text) => {
                    if let Err(e) = protocol::handle_text_frame(text.as_str(), &conn) {
                        tracing::warn!(
                            user_id = %identity,
                            error = %e,
                            "Could not queue pong, dropping connection"
                        );
                        conn.close(CloseReason::Overflow);
                        break;
                    }
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        user_id = %identity,
                        len = data.len(),
                        "Ignoring binary frame"
                    );
                }
                // Control frames only refresh the deadline; axum answers pings itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %identity,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Ok(Some(Err(e))) => {
                tracing::warn!(
                    user_id = %identity,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            Ok(None) => {
                tracing::info!(user_id = %identity, "WebSocket stream ended");
                break;
            }
            Err(_) => {
                tracing::info!(
                    user_id = %identity,
                    timeout_secs = read_timeout.as_secs(),
                    "Read deadline passed, closing idle connection"
                );
                break;
            }
        }
    }

    // Teardown: leave the registry (no-op if a newer connection already
    // replaced us), then let the writer flush its Close frame.
    if let Err(e) = hub.unregister(conn.clone()).await {
        tracing::warn!(user_id = %identity, error = %e, "Unregister failed");
    }
    conn.close(CloseReason::Normal);

    if timeout(settings.write_timeout(), &mut writer_handle).await.is_err() {
        tracing::debug!(user_id = %identity, "Writer did not finish in time, aborting");
        writer_handle.abort();
    }

    tracing::info!(
        user_id = %identity,
        connection_id = %connection_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: drains the outbox into the sink and sends periodic pings.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::Receiver<String>,
    conn: Arc<ConnectionHandle>,
    settings: WsConfig,
) {
    let write_timeout = settings.write_timeout();
    let ping_interval = settings.ping_interval();
    let mut ping_timer = interval_at(Instant::now() + ping_interval, ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = outbox_rx.recv() => match frame {
                Some(first) => {
                    let batch = write_batch(&mut ws_sender, &mut outbox_rx, first);
                    match timeout(write_timeout, batch).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(user_id = %conn.identity(), error = %e, "WebSocket write failed");
                            break;
                        }
                        Err(_) => {
                            tracing::warn!(user_id = %conn.identity(), "WebSocket write deadline passed");
                            break;
                        }
                    }
                }
                None => {
                    // Outbox closed: say goodbye and stop
                    let reason = conn.close_reason();
                    let close = Message::Close(Some(CloseFrame {
                        code: reason.code(),
                        reason: reason.as_str().into(),
                    }));
                    match timeout(write_timeout, ws_sender.send(close)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::debug!(user_id = %conn.identity(), error = %e, "Close frame write failed");
                        }
                        Err(_) => {
                            tracing::debug!(user_id = %conn.identity(), "Close frame write deadline passed");
                        }
                    }
                    break;
                }
            },
            _ = ping_timer.tick() => {
                match timeout(write_timeout, ws_sender.send(Message::Ping(Vec::new().into()))).await {
                    Ok(Ok(())) => {}
                    _ => {
                        tracing::warn!(user_id = %conn.identity(), "Liveness ping failed");
                        break;
                    }
                }
            }
        }
    }

    // Make sure the reader stops even if the failure was on our side
    conn.abort();
}

/// Write `first` and every frame already queued behind it, then flush once.
async fn write_batch(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    outbox_rx: &mut mpsc::Receiver<String>,
    first: String,
) -> Result<(), axum::Error> {
    ws_sender.feed(Message::Text(first.into())).await?;

    let pending = outbox_rx.len();
    for _ in 0..pending {
        match outbox_rx.try_recv() {
            Ok(frame) => ws_sender.feed(Message::Text(frame.into())).await?,
            Err(_) => break,
        }
    }

    ws_sender.flush().await
}
