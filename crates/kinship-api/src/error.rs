use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use kinship_crypto::password::PasswordError;
use kinship_crypto::token::TokenError;
use kinship_db::DbError;
use kinship_types::api::ErrorBody;

use crate::middleware::AuthError;

/// Every failure a handler can return. Each variant maps to one wire `kind`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Same message for unknown username and wrong password.
    #[error("invalid username or password")]
    BadCredentials,

    #[error("{0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[source] DbError),

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Auth(_) | Self::BadCredentials => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
            Self::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "timeout"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        // Storage and internal details stay in the log.
        let message = match &self {
            Self::Storage(e) => {
                error!("Storage failure: {}", e);
                "storage failure, try again later".to_string()
            }
            Self::Internal(e) => {
                error!("Internal failure: {}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                kind: kind.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => Self::NotFound(format!("{} not found", what)),
            DbError::Conflict(what) => Self::Conflict(format!("{} already taken", what)),
            DbError::DuplicateRequest => Self::Conflict(err.to_string()),
            DbError::RequestNotFound => Self::NotFound(err.to_string()),
            DbError::InvalidInput(msg) => Self::Validation(msg.to_string()),
            DbError::Poisoned | DbError::Sqlite(_) => Self::Storage(err),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => Self::BadCredentials,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken | TokenError::ExpiredToken => Self::Auth(AuthError::Token(err)),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
