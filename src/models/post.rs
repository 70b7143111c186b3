use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "post_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Discussion,
    Debate,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub community: String,
    pub post_type: PostType,
    pub side_a: Option<String>,
    pub side_b: Option<String>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub views: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Create post request
#[derive(Debug, Validate, Deserialize)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
    pub community: String,
    pub post_type: Option<PostType>,
    #[validate(length(min = 1, max = 100))]
    pub side_a: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub side_b: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PostAuthor {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct DebateSides {
    pub side_a: String,
    pub side_b: String,
}

// Post detail response
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: PostAuthor,
    pub community: String,
    pub post_type: PostType,
    pub debate_sides: Option<DebateSides>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
    pub views: i32,
    pub created_at: DateTime<Utc>,
    pub user_vote: Option<crate::models::VoteDirection>,
}

// Post list response (for feeds)
#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub id: Uuid,
    pub title: String,
    pub author: PostAuthor,
    pub community: String,
    pub post_type: PostType,
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub user_vote: Option<crate::models::VoteDirection>,
}

// Sorting options for the feed
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    New,
    Top,
}
