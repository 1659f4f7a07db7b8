//! The Hub: single authority for which identity is connected right now.
//!
//! The registry lives inside one control-loop task. Every operation
//! (register, unregister, dispatch lookup, online queries, forced
//! disconnect) is a command on an unbounded channel with a oneshot reply,
//! so they are applied one at a time in arrival order. The loop never
//! waits on a peer: handing a frame to a connection is a non-blocking
//! enqueue, and a full outbox gets the connection evicted.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::connection::{CloseReason, ConnectionHandle};
use super::Identity;

/// Result of handing a frame to the Hub.
///
/// `Delivered` only means the frame reached the connection's outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Offline,
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("hub control loop has stopped")]
    Stopped,
}

/// Commands processed by the control loop.
enum HubCommand {
    Register {
        conn: Arc<ConnectionHandle>,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        conn: Arc<ConnectionHandle>,
        ack: oneshot::Sender<bool>,
    },
    Dispatch {
        identity: Identity,
        frame: String,
        reply: oneshot::Sender<DeliveryStatus>,
    },
    Disconnect {
        identity: Identity,
        reason: CloseReason,
        reply: oneshot::Sender<bool>,
    },
    IsOnline {
        identity: Identity,
        reply: oneshot::Sender<bool>,
    },
    ListOnline {
        reply: oneshot::Sender<Vec<Identity>>,
    },
}

/// Cloneable handle to the Hub's control loop.
#[derive(Clone)]
pub struct Hub {
    cmd_tx: mpsc::UnboundedSender<HubCommand>,
}

impl Hub {
    /// Spawn the control loop on the current runtime and return a handle.
    /// The loop stops once every handle has been dropped.
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_control_loop(cmd_rx));
        Self { cmd_tx }
    }

    /// Make `conn` the live connection for its identity, evicting any
    /// previous one. Returns once the registry has been updated.
    pub async fn register(&self, conn: Arc<ConnectionHandle>) -> Result<(), HubError> {
        let (ack, rx) = oneshot::channel();
        self.send(HubCommand::Register { conn, ack })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Remove `conn` if it is still the live connection for its identity.
    /// Returns `false` when a newer connection had already replaced it.
    pub async fn unregister(&self, conn: Arc<ConnectionHandle>) -> Result<bool, HubError> {
        let (ack, rx) = oneshot::channel();
        self.send(HubCommand::Unregister { conn, ack })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Hand an already-serialized frame to the identity's connection.
    pub async fn dispatch(&self, identity: &str, frame: String) -> Result<DeliveryStatus, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Dispatch {
            identity: identity.to_string(),
            frame,
            reply,
        })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Force-close the identity's live connection, if any.
    pub async fn disconnect(&self, identity: &str, reason: CloseReason) -> Result<bool, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Disconnect {
            identity: identity.to_string(),
            reason,
            reply,
        })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub async fn is_online(&self, identity: &str) -> Result<bool, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::IsOnline {
            identity: identity.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub async fn list_online(&self) -> Result<Vec<Identity>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ListOnline { reply })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    fn send(&self, cmd: HubCommand) -> Result<(), HubError> {
        self.cmd_tx.send(cmd).map_err(|_| HubError::Stopped)
    }
}

/// Registry state owned by the control loop.
#[derive(Default)]
struct Registry {
    connections: HashMap<Identity, Arc<ConnectionHandle>>,
}

impl Registry {
    fn register(&mut self, conn: Arc<ConnectionHandle>) {
        let identity = conn.identity().to_string();
        if let Some(old) = self.connections.insert(identity.clone(), conn.clone()) {
            if old.id() != conn.id() {
                old.close(CloseReason::Replaced);
                tracing::info!(
                    user_id = %identity,
                    old_connection = %old.id(),
                    new_connection = %conn.id(),
                    "Evicted previous connection"
                );
            }
        }
        tracing::info!(
            user_id = %identity,
            connection_id = %conn.id(),
            online = self.connections.len(),
            "Connection registered"
        );
    }

    fn unregister(&mut self, conn: &ConnectionHandle) -> bool {
        let is_current = self
            .connections
            .get(conn.identity())
            .is_some_and(|current| current.id() == conn.id());

        if !is_current {
            tracing::debug!(
                user_id = %conn.identity(),
                connection_id = %conn.id(),
                "Ignoring unregister from superseded connection"
            );
            return false;
        }

        self.connections.remove(conn.identity());
        conn.close(CloseReason::Normal);
        tracing::info!(
            user_id = %conn.identity(),
            connection_id = %conn.id(),
            online = self.connections.len(),
            "Connection unregistered"
        );
        true
    }

    fn dispatch(&mut self, identity: &str, frame: String) -> DeliveryStatus {
        let Some(conn) = self.connections.get(identity) else {
            return DeliveryStatus::Offline;
        };

        match conn.enqueue(frame) {
            Ok(()) => DeliveryStatus::Delivered,
            Err(e) => {
                tracing::warn!(
                    user_id = %identity,
                    connection_id = %conn.id(),
                    error = %e,
                    "Dropping connection that cannot take more frames"
                );
                self.evict(identity, CloseReason::Overflow);
                DeliveryStatus::Offline
            }
        }
    }

    fn evict(&mut self, identity: &str, reason: CloseReason) -> bool {
        match self.connections.remove(identity) {
            Some(conn) => {
                conn.close(reason);
                true
            }
            None => false,
        }
    }
}

async fn run_control_loop(mut cmd_rx: mpsc::UnboundedReceiver<HubCommand>) {
    let mut registry = Registry::default();
    tracing::debug!("Hub control loop started");

    while let Some(cmd) = cmd_rx.recv().await {
        // Replies are best effort: a caller that gave up must not stall the loop.
        match cmd {
            HubCommand::Register { conn, ack } => {
                registry.register(conn);
                let _ = ack.send(());
            }
            HubCommand::Unregister { conn, ack } => {
                let removed = registry.unregister(&conn);
                let _ = ack.send(removed);
            }
            HubCommand::Dispatch {
                identity,
                frame,
                reply,
            } => {
                let status = registry.dispatch(&identity, frame);
                let _ = reply.send(status);
            }
            HubCommand::Disconnect {
                identity,
                reason,
                reply,
            } => {
                let evicted = registry.evict(&identity, reason);
                if evicted {
                    tracing::info!(user_id = %identity, reason = reason.as_str(), "Connection force-closed");
                }
                let _ = reply.send(evicted);
            }
            HubCommand::IsOnline { identity, reply } => {
                let _ = reply.send(registry.connections.contains_key(&identity));
            }
            HubCommand::ListOnline { reply } => {
                let _ = reply.send(registry.connections.keys().cloned().collect());
            }
        }
    }

    for conn in registry.connections.values() {
        conn.close(CloseReason::Normal);
    }
    tracing::debug!("Hub control loop stopped");
}
