use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use kinship_crypto::token::TokenMaker;
use kinship_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

/// Everything a request needs, constructed once in `main`.
pub struct AppStateInner {
    pub db: Database,
    pub tokens: Box<dyn TokenMaker>,
    pub access_token_ttl: chrono::Duration,
    /// Upper bound on each blocking section (DB work, password hashing).
    pub request_timeout: Duration,
}

impl AppStateInner {
    /// Run blocking work (SQLite, Argon2) off the async runtime, bounded by
    /// `request_timeout`.
    ///
    /// On timeout the caller gets [`ApiError::Timeout`]; the blocking task
    /// itself runs to completion, so a transaction is still committed or
    /// rolled back as a unit.
    pub async fn blocking<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        let task = tokio::task::spawn_blocking(move || f(&state));

        match tokio::time::timeout(self.request_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("spawn_blocking join error: {}", e);
                Err(ApiError::Internal(e.to_string()))
            }
            Err(_) => {
                warn!("Blocking section exceeded {:?}", self.request_timeout);
                Err(ApiError::Timeout)
            }
        }
    }

    /// Resolve a token subject to its user id.
    pub fn user_id_of(&self, username: &str) -> Result<i64, ApiError> {
        self.db
            .get_user_by_username(username)?
            .map(|row| row.id)
            .ok_or_else(|| ApiError::NotFound("user not found".to_string()))
    }
}
