use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::store::StoreError;

/// Business error codes shared with the rest of the IM backend.
pub mod codes {
    pub const UNAUTHORIZED: i32 = 4001;
    pub const TOKEN_INVALID: i32 = 4104;
    pub const TOKEN_EXPIRED: i32 = 4105;
    pub const REDIS_ERROR: i32 = 5002;
}

/// Body of every error response: `{"code": .., "msg": .., "data": null}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: i32,
    pub msg: String,
    pub data: Option<()>,
}

/// Why a credential was refused. The stream is never upgraded on any of these.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("no token provided")]
    MissingToken,
    #[error("received an email address instead of a token")]
    EmailAsToken,
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired, please log in again")]
    Expired,
    #[error("token is invalid: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("token is no longer valid, please log in again")]
    Revoked,
    #[error("token was superseded by a login elsewhere")]
    Superseded,
    #[error("token store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl From<jsonwebtoken::errors::Error> for AdmissionError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Invalid(err),
        }
    }
}

impl AdmissionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn error_code(&self) -> i32 {
        match self {
            Self::MissingToken => codes::UNAUTHORIZED,
            Self::Expired | Self::Revoked => codes::TOKEN_EXPIRED,
            Self::EmailAsToken | Self::Malformed | Self::Invalid(_) | Self::Superseded => {
                codes::TOKEN_INVALID
            }
            Self::Store(_) => codes::REDIS_ERROR,
        }
    }

    /// Message safe to show the client.
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(_) => "token is invalid".to_string(),
            Self::Store(_) => "cache service error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        match &self {
            Self::Store(e) => tracing::error!(error = %e, "Token store failure during admission"),
            other => tracing::warn!(reason = %other, "Credential rejected"),
        }

        let body = ErrorBody {
            code: self.error_code(),
            msg: self.user_message(),
            data: None,
        };
        (self.status_code(), Json(body)).into_response()
    }
}
