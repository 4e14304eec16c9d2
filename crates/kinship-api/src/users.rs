use axum::{Json, extract::State, response::IntoResponse};
use axum_extra::extract::WithRejection;

use kinship_types::api::UpdateUserRequest;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::validate;

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(payload): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .blocking(move |s| {
            s.db
                .get_user_by_username(&payload.username)?
                .ok_or_else(|| ApiError::NotFound("user not found".to_string()))
        })
        .await?;

    Ok(Json(user.into_user()))
}

/// Only nickname and gender are mutable. Omitted fields keep their value.
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(payload): CurrentUser,
    WithRejection(Json(req), _): WithRejection<Json<UpdateUserRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(nickname) = &req.nickname {
        validate::nickname(nickname)?;
    }

    let user = state
        .blocking(move |s| {
            let id = s.user_id_of(&payload.username)?;
            Ok(s.db.update_user(id, req.nickname.as_deref(), req.gender)?)
        })
        .await?;

    Ok(Json(user.into_user()))
}
