use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::AuthUser;
use crate::error::AdmissionError;
use crate::state::AppState;
use crate::ws::handler as ws_handler;
use crate::ws::CloseReason;

/// GET /api/health
/// Liveness plus the number of connected users.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let online = state.hub.list_online_users().await.len();
    Json(serde_json::json!({
        "status": "ok",
        "online": online,
    }))
}

/// POST /api/auth/logout
/// Revoke the caller's token and drop their live
/// connection, if any.
async fn logout(State(state): State<AppState>, user: AuthUser) -> Result<StatusCode, AdmissionError> {
    state.sessions.revoke(&user.identity).await?;

    match state.hub.disconnect(&user.identity, CloseReason::Revoked).await {
        Ok(true) => tracing::info!(user_id = %user.identity, "Disconnected live session on logout"),
        Ok(false) => {}
        Err(e) => tracing::warn!(user_id = %user.identity, error = %e, "Hub unavailable on logout"),
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on the upgrade endpoint, per peer IP
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(state.ws.upgrade_replenish_secs)
            .burst_size(state.ws.upgrade_burst)
            .finish()
            .expect("upgrade rate limit is validated at startup"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let ws_routes = Router::new()
        .route("/ws", get(ws_handler::ws_upgrade))
        .route("/api/messages/ws", get(ws_handler::ws_upgrade))
        .layer(GovernorLayer {
            config: governor_config,
        });

    let api_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/logout", post(logout));

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .with_state(state)
}
