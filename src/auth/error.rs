//! Error kinds surfaced by the CSRF guard and the session manager.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing CSRF token")]
    TokenMissing,
    #[error("malformed CSRF token: {0}")]
    TokenMalformed(&'static str),
    #[error("invalid CSRF token: {0}")]
    TokenInvalid(&'static str),
    #[error("session not found")]
    SessionNotFound,
    #[error("malformed session token")]
    SessionTokenMalformed,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// True for the CSRF rejection kinds.
    #[must_use]
    pub fn is_csrf(&self) -> bool {
        matches!(
            self,
            Self::TokenMissing | Self::TokenMalformed(_) | Self::TokenInvalid(_)
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::TokenMissing | Self::TokenMalformed(_) | Self::TokenInvalid(_) => {
                (StatusCode::FORBIDDEN, "Invalid CSRF token".to_string()).into_response()
            }
            Self::SessionNotFound | Self::SessionTokenMalformed => {
                StatusCode::UNAUTHORIZED.into_response()
            }
            Self::Internal(err) => {
                error!("Internal auth failure: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
