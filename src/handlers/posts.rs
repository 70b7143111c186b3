use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    models::{CreatePostRequest, PostResponse, PostSort, VoteRequest, VoteResponse, VoteTarget},
    services::{post_service, vote_service},
};

#[derive(Debug, Deserialize)]
pub struct GetPostsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<PostSort>,
    pub community: Option<String>,
}

pub async fn create_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    payload.validate()?;

    let post = post_service::create_post(&state.db, auth_user.user_id, &payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Post created successfully",
            "post_id": post.id
        })),
    ))
}

pub async fn get_posts(
    State(state): State<AppState>,
    Query(params): Query<GetPostsQuery>,
    auth_user: OptionalAuthUser,
) -> Result<Json<Value>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(25).min(100);
    let offset = (page - 1) * limit;
    let sort = params.sort.unwrap_or(PostSort::New);

    let viewer_id = auth_user.0.as_ref().map(|user| user.user_id);

    let posts = post_service::get_posts(
        &state.db,
        viewer_id,
        params.community.as_deref(),
        sort,
        limit,
        offset,
    )
    .await?;

    Ok(Json(json!({
        "posts": posts,
        "page": page,
        "limit": limit
    })))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    auth_user: OptionalAuthUser,
) -> Result<Json<PostResponse>> {
    let viewer_id = auth_user.0.as_ref().map(|user| user.user_id);

    let post = post_service::get_post_by_id(&state.db, post_id, viewer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    post_service::record_post_view(&state.db, post_id).await?;

    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>> {
    post_service::delete_post(&state.db, auth_user.user_id, post_id).await?;

    Ok(Json(json!({
        "message": "Post deleted successfully"
    })))
}

pub async fn vote_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>> {
    let response = vote_service::cast_vote(
        &state.db,
        auth_user.user_id,
        VoteTarget::Post(post_id),
        payload.direction,
    )
    .await?;

    Ok(Json(response))
}
