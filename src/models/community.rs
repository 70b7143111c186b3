use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub members_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Create community request. The name is normalized before validation against
// the 3-20 length rule, so the raw input only gets a loose upper bound here.
#[derive(Debug, Validate, Deserialize)]
pub struct CreateCommunityRequest {
    #[validate(length(min = 3, max = 100))]
    pub name: String,
    #[validate(length(max = 200))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommunityResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub members_count: i32,
    pub is_member: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub community: String,
    pub joined: bool,
}
