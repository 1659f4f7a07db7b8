use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::outbox::{Outbox, OutboxError};
use super::Identity;

/// Why a connection was closed. Carried to the peer in the Close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer went away or the connection failed on its own.
    Normal,
    /// A newer connection for the same identity took over.
    Replaced,
    /// The peer did not drain its outbox fast enough.
    Overflow,
    /// The identity's credential was revoked.
    Revoked,
}

impl CloseReason {
    pub fn code(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Replaced => 4000,
            Self::Revoked => 4001,
            Self::Overflow => 4008,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Connection closed",
            Self::Replaced => "Session replaced by a newer connection",
            Self::Revoked => "Credential revoked",
            Self::Overflow => "Outbox overflow",
        }
    }
}

/// Shared handle to one live connection.
///
/// The reader and writer pumps own the socket halves; the Hub holds this
/// handle only to enqueue frames and to evict. Everything here is safe to
/// call from any task.
pub struct ConnectionHandle {
    id: Uuid,
    identity: Identity,
    outbox: Outbox,
    shutdown: watch::Sender<bool>,
    close_reason: OnceLock<CloseReason>,
}

impl ConnectionHandle {
    /// Build a handle plus the outbox receiver for the writer pump.
    pub fn new(identity: Identity, outbox_capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbox, rx) = Outbox::new(outbox_capacity);
        let (shutdown, _) = watch::channel(false);
        let handle = Arc::new(Self {
            id: Uuid::now_v7(),
            identity,
            outbox,
            shutdown,
            close_reason: OnceLock::new(),
        });
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Hand a serialized frame to the writer without waiting.
    pub fn enqueue(&self, frame: String) -> Result<(), OutboxError> {
        self.outbox.try_push(frame)
    }

    /// Close the outbox and ask the pumps to tear the stream down.
    ///
    /// Safe to race: only the first caller's reason is kept and only the
    /// first call returns `true`.
    pub fn close(&self, reason: CloseReason) -> bool {
        let _ = self.close_reason.set(reason);
        let closed_now = self.outbox.close();
        self.shutdown.send_replace(true);
        if closed_now {
            tracing::debug!(
                user_id = %self.identity,
                connection_id = %self.id,
                reason = reason.as_str(),
                "Connection outbox closed"
            );
        }
        closed_now
    }

    /// Signal the reader to stop without touching the outbox. Used by the
    /// writer after a failed write.
    pub fn abort(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    pub fn close_reason(&self) -> CloseReason {
        self.close_reason.get().copied().unwrap_or(CloseReason::Normal)
    }

    /// Receiver that flips to `true` once the connection should shut down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
