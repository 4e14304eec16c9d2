use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use thiserror::Error;
use tracing::warn;

use kinship_crypto::token::{TokenError, TokenMaker};
use kinship_types::api::Payload;

use crate::error::ApiError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header is not provided")]
    MissingCredential,

    #[error("authorization header is malformed")]
    MalformedCredential,

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Validate a raw `Authorization` header value and return the token payload.
///
/// The scheme must be exactly `Bearer ` (case-sensitive). Whitespace around
/// the token itself is ignored, so `"Bearer   tok  "` yields `tok`.
///
/// Pure: no database access. Resolving the subject to a user row is up to the
/// caller.
pub fn authenticate(maker: &dyn TokenMaker, header: Option<&str>) -> Result<Payload, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MalformedCredential)?;

    Ok(maker.verify_token(token)?)
}

/// The verified identity of the caller.
///
/// Taking this as a handler argument is what makes a route protected; the
/// payload is produced once, here, and handed over already typed.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Payload);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .map(|v| v.to_str().map_err(|_| AuthError::MalformedCredential))
            .transpose();

        match header.and_then(|h| authenticate(state.tokens.as_ref(), h)) {
            Ok(payload) => Ok(CurrentUser(payload)),
            Err(e) => {
                warn!("Rejected {} {}: {}", parts.method, parts.uri.path(), e);
                Err(e.into())
            }
        }
    }
}
