//! Session admission: turns a presented credential into an identity.
//!
//! A token is accepted only if its signature and expiry check out locally
//! AND it is byte-for-byte the token currently on record for its identity.
//! Issuing a new token overwrites the record, so every older token for
//! that identity stops working immediately.

use chrono::Duration;

use crate::auth::jwt;
use crate::auth::store::{StoreError, TokenStore};
use crate::error::AdmissionError;
use crate::ws::Identity;

#[derive(Clone)]
pub struct SessionValidator {
    secret: Vec<u8>,
    ttl: Duration,
    store: TokenStore,
}

impl SessionValidator {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration, store: TokenStore) -> Self {
        Self {
            secret: secret.into(),
            ttl,
            store,
        }
    }

    /// Sign a fresh token for `identity` and make it the only valid one.
    pub async fn issue(&self, identity: &str) -> Result<String, AdmissionError> {
        let token = jwt::issue_token(&self.secret, identity, self.ttl)?;
        let ttl_secs = self.ttl.num_seconds().max(1) as u64;
        self.store.put(identity, &token, ttl_secs).await?;
        tracing::info!(user_id = %identity, "Session token issued");
        Ok(token)
    }

    /// Forget the identity's token (logout).
    pub async fn revoke(&self, identity: &str) -> Result<(), StoreError> {
        self.store.remove(identity).await?;
        tracing::info!(user_id = %identity, "Session token revoked");
        Ok(())
    }

    /// Resolve a raw credential (with or without `Bearer ` prefix).
    pub async fn validate(&self, raw: &str) -> Result<Identity, AdmissionError> {
        let token = jwt::normalize_token(raw);
        if token.is_empty() {
            return Err(AdmissionError::MissingToken);
        }

        if !jwt::looks_like_jwt(token) {
            if token.contains('@') {
                return Err(AdmissionError::EmailAsToken);
            }
            return Err(AdmissionError::Malformed);
        }

        let claims = jwt::validate_token(&self.secret, token)?;

        match self.store.get(&claims.email).await? {
            None => Err(AdmissionError::Revoked),
            Some(stored) if stored != token => Err(AdmissionError::Superseded),
            Some(_) => Ok(claims.email),
        }
    }
}
