use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;
use std::convert::Infallible;

use crate::error::AdmissionError;
use crate::state::AppState;
use crate::ws::Identity;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn header_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.trim().is_empty())
}

/// Raw credential for the upgrade path: `Authorization` header first, then
/// the `token` query parameter (browsers cannot set headers on a WebSocket
/// handshake). Validation happens in the handler.
#[derive(Debug, Clone)]
pub struct UpgradeCredential(pub Option<String>);

impl<S> FromRequestParts<S> for UpgradeCredential
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(token) = header_token(parts) {
            return Ok(Self(Some(token)));
        }

        let query = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.trim().is_empty());
        Ok(Self(query))
    }
}

/// Authenticated caller resolved from `Authorization: Bearer`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: Identity,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AdmissionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = header_token(parts).ok_or(AdmissionError::MissingToken)?;
        let identity = state.sessions.validate(&token).await?;
        Ok(Self { identity })
    }
}
