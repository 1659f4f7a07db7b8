//! Keeps exactly one valid token string per identity.
//!
//! Writing a token for an identity replaces whatever was stored before,
//! which is what makes a fresh login invalidate the previous session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::sync::Arc;

const TOKEN_PREFIX: &str = "jwt:";

fn token_key(identity: &str) -> String {
    format!("{}{}", TOKEN_PREFIX, identity)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Token store backend.
#[derive(Clone)]
pub enum TokenStore {
    /// Shared Redis instance; survives restarts and works across nodes.
    Redis(ConnectionManager),
    /// In-process map for single-node development and tests.
    Memory(Arc<DashMap<String, (String, DateTime<Utc>)>>),
}

impl TokenStore {
    pub async fn connect_redis(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::Redis(conn))
    }

    pub fn memory() -> Self {
        Self::Memory(Arc::new(DashMap::new()))
    }

    /// Record `token` as the only valid token for `identity`.
    pub async fn put(&self, identity: &str, token: &str, ttl_secs: u64) -> Result<(), StoreError> {
        match self {
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.set_ex(token_key(identity), token, ttl_secs).await?;
            }
            Self::Memory(map) => {
                let expires_at = Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
                map.insert(token_key(identity), (token.to_string(), expires_at));
            }
        }
        Ok(())
    }

    /// Currently valid token for `identity`, if any.
    pub async fn get(&self, identity: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                let token: Option<String> = conn.get(token_key(identity)).await?;
                Ok(token)
            }
            Self::Memory(map) => {
                let key = token_key(identity);
                let live = map
                    .get(&key)
                    .filter(|entry| entry.value().1 > Utc::now())
                    .map(|entry| entry.value().0.clone());
                if live.is_none() {
                    // Only drop what is expired; a put may have landed since the read.
                    map.remove_if(&key, |_, (_, expires_at)| *expires_at <= Utc::now());
                }
                Ok(live)
            }
        }
    }

    pub async fn remove(&self, identity: &str) -> Result<(), StoreError> {
        match self {
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.del(token_key(identity)).await?;
            }
            Self::Memory(map) => {
                map.remove(&token_key(identity));
            }
        }
        Ok(())
    }
}
