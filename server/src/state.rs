use crate::auth::SessionValidator;
use crate::config::WsConfig;
use crate::ws::Hub;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the connection registry's control loop
    pub hub: Hub,
    /// Resolves credentials to identities
    pub sessions: SessionValidator,
    /// Per-connection limits and heartbeat timing
    pub ws: WsConfig,
}
