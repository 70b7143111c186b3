use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::Result,
    models::{CommentResponse, CreateCommentRequest, VoteRequest, VoteResponse, VoteTarget},
    services::{comment_service, vote_service},
};

pub async fn create_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>)> {
    payload.validate()?;

    let comment = comment_service::create_comment(
        &state.db,
        auth_user.user_id,
        &auth_user.username,
        &payload,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_post_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    auth_user: OptionalAuthUser,
) -> Result<Json<Value>> {
    let viewer_id = auth_user.0.as_ref().map(|user| user.user_id);

    let comments = comment_service::get_post_comments(&state.db, post_id, viewer_id).await?;

    Ok(Json(json!({
        "comments": comments,
        "post_id": post_id
    })))
}

pub async fn vote_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>> {
    let response = vote_service::cast_vote(
        &state.db,
        auth_user.user_id,
        VoteTarget::Comment(comment_id),
        payload.direction,
    )
    .await?;

    Ok(Json(response))
}
