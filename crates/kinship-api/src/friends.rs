use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use tracing::info;

use kinship_db::models::FriendRow;
use kinship_types::api::{FriendListResponse, FriendRequestBody};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::validate;

pub async fn send_request(
    State(state): State<AppState>,
    CurrentUser(payload): CurrentUser,
    WithRejection(Json(req), _): WithRejection<Json<FriendRequestBody>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    validate::request_message(req.message.as_deref())?;

    let edge = state
        .blocking(move |s| {
            let me = s.user_id_of(&payload.username)?;
            s.db.create_request(me, req.friend_id, req.message.as_deref())?;
            Ok(s.db.get_edge(me, req.friend_id)?)
        })
        .await?;

    info!("Friend request {} -> {}", edge.user_id, edge.friend_id);
    Ok((StatusCode::CREATED, Json(edge.into_edge())))
}

/// Accept the request `requester -> caller`. Returns the caller's new edge.
pub async fn accept_request(
    State(state): State<AppState>,
    CurrentUser(payload): CurrentUser,
    Path(requester): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let edge = state
        .blocking(move |s| {
            let me = s.user_id_of(&payload.username)?;
            s.db.accept_request(me, requester)?;
            Ok(s.db.get_edge(me, requester)?)
        })
        .await?;

    info!("Friendship {} <-> {}", edge.user_id, edge.friend_id);
    Ok(Json(edge.into_edge()))
}

pub async fn reject_request(
    State(state): State<AppState>,
    CurrentUser(payload): CurrentUser,
    Path(requester): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .blocking(move |s| {
            let me = s.user_id_of(&payload.username)?;
            Ok(s.db.reject_request(me, requester)?)
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_friends(
    State(state): State<AppState>,
    CurrentUser(payload): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    list(state, payload.username, |db, me| db.list_accepted_edges(me)).await
}

pub async fn list_incoming(
    State(state): State<AppState>,
    CurrentUser(payload): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    list(state, payload.username, |db, me| db.list_incoming_requests(me)).await
}

pub async fn list_outgoing(
    State(state): State<AppState>,
    CurrentUser(payload): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    list(state, payload.username, |db, me| db.list_outgoing_requests(me)).await
}

async fn list<F>(state: AppState, username: String, query: F) -> Result<Json<FriendListResponse>, ApiError>
where
    F: FnOnce(&kinship_db::Database, i64) -> kinship_db::Result<Vec<FriendRow>> + Send + 'static,
{
    let rows = state
        .blocking(move |s| {
            let me = s.user_id_of(&username)?;
            Ok(query(&s.db, me)?)
        })
        .await?;

    Ok(Json(FriendListResponse {
        edges: rows.into_iter().map(FriendRow::into_edge).collect(),
    }))
}
