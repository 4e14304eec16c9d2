pub mod auth;
pub mod error;
pub mod friends;
pub mod middleware;
pub mod state;
pub mod users;
pub mod validate;

#[cfg(test)]
mod tests;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Build the HTTP surface over an explicitly constructed state.
///
/// Routes that take a [`middleware::CurrentUser`] argument are the protected
/// ones; the rest are public.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/user", post(auth::register).get(users::get_user).put(users::update_user))
        .route("/user/login", post(auth::login))
        .route("/friends", get(friends::list_friends))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests/incoming", get(friends::list_incoming))
        .route("/friends/requests/outgoing", get(friends::list_outgoing))
        .route("/friends/requests/{user_id}/accept", post(friends::accept_request))
        .route("/friends/requests/{user_id}/reject", post(friends::reject_request))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}
