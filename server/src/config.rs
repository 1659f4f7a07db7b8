use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// IM realtime delivery server
///
/// Only flags that were actually given (or set through their env var) are
/// merged over the TOML file; everything left unset falls through to the
/// lower layers.
#[derive(Parser, Serialize, Debug)]
#[command(name = "im-server", version, about = "IM realtime delivery server")]
pub struct Cli {
    /// Port to listen on [default: 8080]
    #[arg(long, env = "IM_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "IM_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./im-server.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "IM_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// HMAC secret used to sign and verify session tokens
    #[arg(long, env = "IM_JWT_SECRET", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Session token lifetime in hours [default: 8]
    #[arg(long, env = "IM_JWT_EXPIRATION_HOURS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_expiration_hours: Option<i64>,

    /// Where the single valid token per user is kept: "redis" or "memory" [default: redis]
    #[arg(long, env = "IM_TOKEN_STORE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_store: Option<String>,

    /// Redis connection URL (used when token_store = "redis")
    #[arg(long, env = "IM_REDIS_URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default)]
    pub generate_config: bool,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub token_store: String,
    pub redis_url: String,

    /// WebSocket tuning (loaded from [ws] section in TOML)
    #[serde(default = "default_ws_config")]
    pub ws: Option<WsConfig>,
}

/// Per-connection limits and heartbeat timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Frames a connection may have queued before it is dropped (default: 256)
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Idle read deadline in seconds (default: 60)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Liveness probe interval in seconds, must be below read_timeout_secs (default: 54)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Deadline for a single write batch in seconds (default: 10)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Upgrade requests allowed in a burst per peer IP (default: 30)
    #[serde(default = "default_upgrade_burst")]
    pub upgrade_burst: u32,

    /// Seconds to replenish one upgrade token per peer IP (default: 2)
    #[serde(default = "default_upgrade_replenish")]
    pub upgrade_replenish_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            read_timeout_secs: 60,
            ping_interval_secs: 54,
            write_timeout_secs: 10,
            upgrade_burst: 30,
            upgrade_replenish_secs: 2,
        }
    }
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_read_timeout() -> u64 {
    60
}

fn default_ping_interval() -> u64 {
    54
}

fn default_write_timeout() -> u64 {
    10
}

fn default_upgrade_burst() -> u32 {
    30
}

fn default_upgrade_replenish() -> u64 {
    2
}

fn default_ws_config() -> Option<WsConfig> {
    Some(WsConfig::default())
}

impl WsConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid("ws.outbox_capacity must be at least 1"));
        }
        if self.write_timeout_secs == 0 || self.ping_interval_secs == 0 {
            return Err(ConfigError::Invalid("ws timeouts must be non-zero"));
        }
        if self.upgrade_burst == 0 || self.upgrade_replenish_secs == 0 {
            return Err(ConfigError::Invalid("ws upgrade rate limit must be non-zero"));
        }
        // A healthy peer has to see a probe before its read deadline passes.
        if self.ping_interval_secs >= self.read_timeout_secs {
            return Err(ConfigError::HeartbeatOrder {
                ping_interval_secs: self.ping_interval_secs,
                read_timeout_secs: self.read_timeout_secs,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("jwt_secret is not set (IM_JWT_SECRET or --jwt-secret)")]
    MissingJwtSecret,
    #[error("ws.ping_interval_secs ({ping_interval_secs}) must be less than ws.read_timeout_secs ({read_timeout_secs})")]
    HeartbeatOrder {
        ping_interval_secs: u64,
        read_timeout_secs: u64,
    },
    #[error("unknown token_store {0:?}, expected \"redis\" or \"memory\"")]
    UnknownTokenStore(String),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            config: "./im-server.toml".to_string(),
            json_logs: false,
            generate_config: false,
            jwt_secret: String::new(),
            jwt_expiration_hours: 8,
            token_store: "redis".to_string(),
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            ws: Some(WsConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (IM_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self, figment::Error> {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("IM_").ignore(&["config"]))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    /// WebSocket settings, falling back to defaults when the section is absent.
    pub fn ws_config(&self) -> WsConfig {
        self.ws.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        if self.jwt_expiration_hours <= 0 {
            return Err(ConfigError::Invalid("jwt_expiration_hours must be positive"));
        }
        match self.token_store.as_str() {
            "redis" | "memory" => {}
            other => return Err(ConfigError::UnknownTokenStore(other.to_string())),
        }
        self.ws_config().validate()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# IM Realtime Delivery Server Configuration
# Place this file at ./im-server.toml or specify with --config <path>
# All settings can be overridden via environment variables (IM_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Secret for signing session tokens (required)
# jwt_secret = ""

# Session token lifetime in hours (default: 8)
# jwt_expiration_hours = 8

# Token store: "redis" (production) or "memory" (single node / development)
# token_store = "redis"
# redis_url = "redis://127.0.0.1:6379/0"

# ---- WebSocket ----
# [ws]

# Frames queued per connection before it is dropped as too slow
# outbox_capacity = 256

# Heartbeat: a connection silent for read_timeout_secs is closed; the server
# probes every ping_interval_secs, which must stay below read_timeout_secs
# read_timeout_secs = 60
# ping_interval_secs = 54

# Deadline for flushing one batch of frames
# write_timeout_secs = 10

# Upgrade rate limit per peer IP
# upgrade_burst = 30
# upgrade_replenish_secs = 2
"#
    .to_string()
}
