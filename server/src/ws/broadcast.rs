use serde::Serialize;

use super::hub::{DeliveryStatus, Hub, HubError};
use super::protocol::{Envelope, EnvelopeKind};
use super::Identity;

/// Dispatch API used by the services that own messages and friendships.
impl Hub {
    /// Wrap `payload` in an envelope of `kind` and hand it to the
    /// identity's live connection.
    pub async fn send_envelope<T: Serialize>(
        &self,
        identity: &str,
        kind: EnvelopeKind,
        payload: &T,
    ) -> Result<DeliveryStatus, HubError> {
        let frame = Envelope::with_payload(kind, payload)?.encode()?;
        self.dispatch(identity, frame).await
    }

    /// Push a chat message to `identity`.
    pub async fn send_to_user<T: Serialize>(
        &self,
        identity: &str,
        payload: &T,
    ) -> Result<DeliveryStatus, HubError> {
        self.send_envelope(identity, EnvelopeKind::Message, payload).await
    }

    pub async fn notify_friend_request<T: Serialize>(
        &self,
        identity: &str,
        request: &T,
    ) -> Result<DeliveryStatus, HubError> {
        let status = self
            .send_envelope(identity, EnvelopeKind::FriendRequest, request)
            .await?;
        tracing::info!(user_id = %identity, status = ?status, "Friend request notification sent");
        Ok(status)
    }

    pub async fn notify_friend_accepted<T: Serialize>(
        &self,
        identity: &str,
        friend: &T,
    ) -> Result<DeliveryStatus, HubError> {
        let status = self
            .send_envelope(identity, EnvelopeKind::FriendAccepted, friend)
            .await?;
        tracing::info!(user_id = %identity, status = ?status, "Friend accepted notification sent");
        Ok(status)
    }

    /// A stopped Hub has nobody online.
    pub async fn is_user_online(&self, identity: &str) -> bool {
        self.is_online(identity).await.unwrap_or_else(|e| {
            tracing::warn!(user_id = %identity, error = %e, "Online check failed");
            false
        })
    }

    pub async fn list_online_users(&self) -> Vec<Identity> {
        self.list_online().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Online listing failed");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::ConnectionHandle;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_to_user_wraps_payload_as_message() {
        let hub = Hub::spawn();
        let (conn, mut rx) = ConnectionHandle::new("a@example.com".to_string(), 4);
        hub.register(conn).await.unwrap();

        let msg = json!({"from": "b@example.com", "content": "hi"});
        let status = hub.send_to_user("a@example.com", &msg).await.unwrap();
        assert_eq!(status, DeliveryStatus::Delivered);

        let env = Envelope::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Message);
        assert_eq!(env.data, Some(msg));
    }

    #[tokio::test]
    async fn test_friend_notifications_use_their_own_kinds() {
        let hub = Hub::spawn();
        let (conn, mut rx) = ConnectionHandle::new("a@example.com".to_string(), 4);
        hub.register(conn).await.unwrap();

        hub.notify_friend_request("a@example.com", &json!({"id": 7})).await.unwrap();
        hub.notify_friend_accepted("a@example.com", &json!({"id": 7})).await.unwrap();

        let first = Envelope::decode(&rx.recv().await.unwrap()).unwrap();
        let second = Envelope::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.kind, EnvelopeKind::FriendRequest);
        assert_eq!(second.kind, EnvelopeKind::FriendAccepted);
    }

    #[tokio::test]
    async fn test_offline_user_reports_offline() {
        let hub = Hub::spawn();
        let status = hub.send_to_user("ghost@example.com", &json!("hello")).await.unwrap();
        assert_eq!(status, DeliveryStatus::Offline);
        assert!(!hub.is_user_online("ghost@example.com").await);
        assert!(hub.list_online_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_online_queries_track_registry() {
        let hub = Hub::spawn();
        let (conn, _rx) = ConnectionHandle::new("a@example.com".to_string(), 4);
        hub.register(conn.clone()).await.unwrap();

        assert!(hub.is_user_online("a@example.com").await);
        assert_eq!(hub.list_online_users().await, vec!["a@example.com".to_string()]);

        hub.unregister(conn).await.unwrap();
        assert!(!hub.is_user_online("a@example.com").await);
    }
}
