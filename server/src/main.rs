use std::net::SocketAddr;
use tokio::net::TcpListener;

use im_server::auth::{SessionValidator, TokenStore};
use im_server::config::{generate_config_template, Config};
use im_server::{routes, state, ws};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("im_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter)
            .init();
    }

    tracing::info!("IM server v{} starting", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    let ws_config = config.ws_config();

    // Single valid token per user lives in the token store
    let store = match config.token_store.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory token store; sessions do not survive restarts");
            TokenStore::memory()
        }
        _ => {
            let store = TokenStore::connect_redis(&config.redis_url).await?;
            tracing::info!("Connected to token store at {}", config.redis_url);
            store
        }
    };

    let sessions = SessionValidator::new(
        config.jwt_secret.clone().into_bytes(),
        chrono::Duration::hours(config.jwt_expiration_hours),
        store,
    );

    // Spawn the Hub control loop
    let hub = ws::Hub::spawn();

    tracing::info!(
        outbox_capacity = ws_config.outbox_capacity,
        read_timeout_secs = ws_config.read_timeout_secs,
        ping_interval_secs = ws_config.ping_interval_secs,
        write_timeout_secs = ws_config.write_timeout_secs,
        "WebSocket hub ready"
    );

    let app_state = state::AppState {
        hub,
        sessions,
        ws: ws_config,
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
