use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Why a frame could not be handed to a connection's writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutboxError {
    #[error("outbox is full")]
    Full,
    #[error("outbox is closed")]
    Closed,
}

/// Bounded per-connection queue of serialized frames.
///
/// Producers never block: a push either lands in the queue or fails
/// immediately. Closing drops the only sender, so the writer sees the
/// end of the queue once it has drained whatever was already enqueued.
pub struct Outbox {
    tx: Mutex<Option<mpsc::Sender<String>>>,
}

impl Outbox {
    /// Create an outbox holding at most `capacity` frames, plus the
    /// receiving half owned by the writer pump.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Non-blocking enqueue.
    pub fn try_push(&self, frame: String) -> Result<(), OutboxError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.as_ref().ok_or(OutboxError::Closed)?;
        tx.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => OutboxError::Full,
            TrySendError::Closed(_) => OutboxError::Closed,
        })
    }

    /// Close the outbox. Returns `true` only for the call that actually
    /// closed it; later calls are no-ops.
    pub fn close(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_come_out_in_push_order() {
        let (outbox, mut rx) = Outbox::new(4);
        outbox.try_push("a".to_string()).unwrap();
        outbox.try_push("b".to_string()).unwrap();
        outbox.try_push("c".to_string()).unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.as_deref(), Some("b"));
        assert_eq!(rx.recv().await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_push_fails_fast_when_full() {
        let (outbox, _rx) = Outbox::new(2);
        outbox.try_push("1".to_string()).unwrap();
        outbox.try_push("2".to_string()).unwrap();
        assert_eq!(outbox.try_push("3".to_string()), Err(OutboxError::Full));
    }

    #[tokio::test]
    async fn test_close_twice_is_a_noop() {
        let (outbox, _rx) = Outbox::new(2);
        assert!(outbox.close());
        assert!(!outbox.close());
        assert!(outbox.is_closed());
        assert_eq!(outbox.try_push("late".to_string()), Err(OutboxError::Closed));
    }

    #[tokio::test]
    async fn test_receiver_drains_before_seeing_close() {
        let (outbox, mut rx) = Outbox::new(4);
        outbox.try_push("last words".to_string()).unwrap();
        outbox.close();

        assert_eq!(rx.recv().await.as_deref(), Some("last words"));
        assert_eq!(rx.recv().await, None);
    }
}
