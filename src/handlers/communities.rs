use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    models::{CommunityResponse, CreateCommunityRequest, MembershipResponse},
    services::{community_service, user_service},
};

#[derive(Debug, Deserialize)]
pub struct GetCommunitiesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn create_community(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateCommunityRequest>,
) -> Result<(StatusCode, Json<CommunityResponse>)> {
    payload.validate()?;

    let community = community_service::create_community(
        &state.db,
        auth_user.user_id,
        &payload.name,
        payload.description.as_deref(),
    )
    .await?;

    tracing::info!(community = %community.name, "community created");

    Ok((
        StatusCode::CREATED,
        Json(CommunityResponse {
            id: community.id,
            name: community.name,
            description: community.description,
            members_count: community.members_count,
            is_member: true,
            created_at: community.created_at,
        }),
    ))
}

pub async fn get_communities(
    State(state): State<AppState>,
    Query(params): Query<GetCommunitiesQuery>,
) -> Result<Json<Value>> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).min(100);
    let offset = (page - 1) * limit;

    let communities = community_service::get_communities(&state.db, limit, offset).await?;

    Ok(Json(json!({
        "communities": communities,
        "page": page,
        "limit": limit
    })))
}

pub async fn get_community(
    State(state): State<AppState>,
    Path(name): Path<String>,
    auth_user: OptionalAuthUser,
) -> Result<Json<CommunityResponse>> {
    let name = community_service::normalize_name(&name);

    let community = community_service::get_community_by_name(&state.db, &name)
        .await?
        .ok_or_else(|| AppError::NotFound("Community not found".to_string()))?;

    let is_member = if let Some(auth_user) = auth_user.0.as_ref() {
        user_service::get_user_by_id(&state.db, auth_user.user_id)
            .await?
            .map(|user| user.joined_communities.contains(&community.name))
            .unwrap_or(false)
    } else {
        false
    };

    Ok(Json(CommunityResponse {
        id: community.id,
        name: community.name,
        description: community.description,
        members_count: community.members_count,
        is_member,
        created_at: community.created_at,
    }))
}

/// Member count recomputed from user records next to the denormalized
/// counter, so drift is visible to an operator.
pub async fn get_community_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let name = community_service::normalize_name(&name);

    let community = community_service::get_community_by_name(&state.db, &name)
        .await?
        .ok_or_else(|| AppError::NotFound("Community not found".to_string()))?;

    let live_count = community_service::count_members_live(&state.db, &community.name).await?;

    if live_count != community.members_count as i64 {
        tracing::warn!(
            community = %community.name,
            counter = community.members_count,
            live = live_count,
            "members_count differs from recomputed membership"
        );
    }

    Ok(Json(json!({
        "name": community.name,
        "members_count": community.members_count,
        "members_count_live": live_count
    })))
}

pub async fn toggle_membership(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<MembershipResponse>> {
    let name = community_service::normalize_name(&name);

    let response = community_service::toggle_membership(&state.db, auth_user.user_id, &name).await?;

    Ok(Json(response))
}
