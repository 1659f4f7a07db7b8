use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ws::connection::ConnectionHandle;
use crate::ws::outbox::OutboxError;

/// Tag carried in the `type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Message,
    FriendRequest,
    FriendAccepted,
    Ping,
    Pong,
    Typing,
}

impl EnvelopeKind {
    /// Heartbeat kinds are the only ones allowed to travel without data.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

/// JSON frame exchanged over a connection:
/// `{"type": "...", "data": ..., "timestamp": <unix seconds>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Absent on heartbeats. An explicit `null` payload stays `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: i64,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Envelope stamped with the current time.
    pub fn new(kind: EnvelopeKind, data: Option<Value>) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Wrap an application payload. Heartbeat kinds drop it.
    pub fn with_payload<T: Serialize>(kind: EnvelopeKind, payload: &T) -> serde_json::Result<Self> {
        let data = if kind.is_heartbeat() {
            None
        } else {
            Some(serde_json::to_value(payload)?)
        };
        Ok(Self::new(kind, data))
    }

    pub fn pong() -> Self {
        Self::new(EnvelopeKind::Pong, None)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Handle one inbound text frame from the peer.
///
/// Only a failure to queue the `pong` reply is reported; anything the
/// peer sends that we do not understand is logged and dropped.
pub fn handle_text_frame(text: &str, conn: &ConnectionHandle) -> Result<(), OutboxError> {
    let envelope = match Envelope::decode(text) {
        Ok(env) => env,
        Err(e) => {
            tracing::debug!(
                user_id = %conn.identity(),
                error = %e,
                "Ignoring unparseable frame: {}",
                text.chars().take(100).collect::<String>()
            );
            return Ok(());
        }
    };

    match envelope.kind {
        EnvelopeKind::Ping => {
            let pong = match Envelope::pong().encode() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode pong envelope");
                    return Ok(());
                }
            };
            conn.enqueue(pong)
        }
        EnvelopeKind::Typing => {
            tracing::debug!(user_id = %conn.identity(), "User is typing");
            Ok(())
        }
        other => {
            tracing::debug!(
                user_id = %conn.identity(),
                kind = ?other,
                "Ignoring server-bound envelope of unexpected kind"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_uses_type_data_timestamp() {
        let env = Envelope {
            kind: EnvelopeKind::FriendRequest,
            data: Some(json!({"from": "b@example.com"})),
            timestamp: 1_700_000_000,
        };
        let value: Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "friend_request",
                "data": {"from": "b@example.com"},
                "timestamp": 1_700_000_000
            })
        );
    }

    #[test]
    fn test_pong_has_no_data_field() {
        let value: Value = serde_json::from_str(&Envelope::pong().encode().unwrap()).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(value.get("data").is_none());
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_with_payload_drops_data_for_heartbeats() {
        let env = Envelope::with_payload(EnvelopeKind::Ping, &json!({"ignored": true})).unwrap();
        assert_eq!(env.data, None);

        let env = Envelope::with_payload(EnvelopeKind::Message, &json!("hi")).unwrap();
        assert_eq!(env.data, Some(json!("hi")));
    }

    #[test]
    fn test_decode_accepts_client_ping_without_timestamp() {
        let env = Envelope::decode(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Ping);
        assert_eq!(env.timestamp, 0);
    }

    #[test]
    fn test_null_payload_survives_decode() {
        let env = Envelope::with_payload(EnvelopeKind::Message, &Value::Null).unwrap();
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded.data, Some(Value::Null));

        let pong = Envelope::decode(&Envelope::pong().encode().unwrap()).unwrap();
        assert_eq!(pong.data, None);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(Envelope::decode(r#"{"type":"recall","data":1}"#).is_err());
    }

    #[tokio::test]
    async fn test_ping_frame_queues_pong() {
        let (conn, mut rx) = ConnectionHandle::new("a@example.com".to_string(), 4);
        handle_text_frame(r#"{"type":"ping","timestamp":1}"#, &conn).unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(Envelope::decode(&frame).unwrap().kind, EnvelopeKind::Pong);
    }

    #[tokio::test]
    async fn test_typing_and_garbage_queue_nothing() {
        let (conn, mut rx) = ConnectionHandle::new("a@example.com".to_string(), 4);
        handle_text_frame(r#"{"type":"typing","data":{"to":"b"}}"#, &conn).unwrap();
        handle_text_frame("not json at all", &conn).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_on_full_outbox_reports_overflow() {
        let (conn, _rx) = ConnectionHandle::new("a@example.com".to_string(), 1);
        conn.enqueue("filler".to_string()).unwrap();
        assert_eq!(
            handle_text_frame(r#"{"type":"ping"}"#, &conn),
            Err(OutboxError::Full)
        );
    }
}
