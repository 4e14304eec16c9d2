use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use tracing::{info, warn};

use kinship_crypto::password::{compare_password, dummy_verify, generate_salt, hash_password};
use kinship_db::models::NewUser;
use kinship_types::api::{LoginRequest, LoginResponse, RegisterRequest};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validate;

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    validate::registration(&req)?;

    let user = state
        .blocking(move |s| {
            // Hash password with Argon2id under a fresh salt
            let salt = generate_salt();
            let password_hash = hash_password(&req.password, &salt)?;

            let id = s.db.create_user(&NewUser {
                username: req.username,
                nickname: req.nickname,
                password_hash,
                salt,
                email: req.email,
                gender: req.gender,
            })?;

            s.db
                .get_user_by_id(id)?
                .ok_or_else(|| ApiError::Internal(format!("user {} vanished after insert", id)))
        })
        .await?;

    info!("Registered user {} (id {})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(user.into_user())))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();

    let result = state
        .blocking(move |s| {
            let Some(user) = s.db.get_user_by_username(&req.username)? else {
                dummy_verify(&req.password);
                return Err(ApiError::BadCredentials);
            };

            compare_password(&req.password, &user.password, &user.salt)?;

            let (token, payload) = s.tokens.create_token(&user.username, s.access_token_ttl)?;
            Ok(LoginResponse {
                token,
                expires_at: payload.expires_at,
                user: user.into_user(),
            })
        })
        .await;

    match result {
        Ok(response) => Ok(Json(response)),
        Err(ApiError::BadCredentials) => {
            warn!("Failed login for '{}'", username);
            Err(ApiError::BadCredentials)
        }
        Err(e) => Err(e),
    }
}
