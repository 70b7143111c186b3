use axum::{extract::State, response::Json};
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, Result},
    models::{UpdateProfileRequest, UserResponse},
    services::user_service,
};

pub async fn get_current_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<UserResponse>> {
    let user = user_service::get_user_by_id(&state.db, auth_user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    user_service::update_bio(&state.db, auth_user.user_id, payload.bio.as_deref()).await?;

    Ok(Json(json!({
        "message": "Profile updated successfully"
    })))
}
