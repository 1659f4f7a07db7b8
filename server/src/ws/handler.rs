use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};

use crate::auth::middleware::UpgradeCredential;
use crate::error::AdmissionError;
use crate::state::AppState;
use crate::ws::actor;

/// GET /ws (also /api/messages/ws)
/// WebSocket upgrade endpoint. The credential comes from the Authorization
/// header or the `token` query parameter. On auth failure the request is
/// answered with a JSON error and never upgraded.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    UpgradeCredential(credential): UpgradeCredential,
    ws: WebSocketUpgrade,
) -> Result<Response, AdmissionError> {
    let raw = credential.ok_or(AdmissionError::MissingToken)?;
    let identity = state.sessions.validate(&raw).await?;

    tracing::info!(user_id = %identity, "WebSocket connection authenticated");

    let hub = state.hub.clone();
    let settings = state.ws.clone();
    Ok(ws
        .on_failed_upgrade(|e: axum::Error| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| actor::run_connection(socket, hub, identity, settings)))
}
