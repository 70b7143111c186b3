use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        CreatePostRequest, DebateSides, Post, PostAuthor, PostListResponse, PostResponse, PostSort,
        PostType,
    },
    services::community_service,
};

pub async fn get_post_by_id_raw(db: &PgPool, post_id: Uuid) -> Result<Option<Post>> {
    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(db)
        .await?;

    Ok(post)
}

pub async fn create_post(db: &PgPool, author_id: Uuid, payload: &CreatePostRequest) -> Result<Post> {
    let community = community_service::normalize_name(&payload.community);

    community_service::get_community_by_name(db, &community)
        .await?
        .ok_or_else(|| AppError::NotFound("Community not found".to_string()))?;

    let post_type = payload.post_type.unwrap_or(PostType::Discussion);

    // Debate sides travel with debate posts only; a discussion post silently
    // drops any sides the client sent.
    let (side_a, side_b) = match post_type {
        PostType::Debate => {
            let side_a = payload
                .side_a
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("Both debate sides must be defined".to_string()))?;
            let side_b = payload
                .side_b
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("Both debate sides must be defined".to_string()))?;
            (Some(side_a), Some(side_b))
        }
        PostType::Discussion => (None, None),
    };

    let post = sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO posts (
            id, title, content, author_id, community, post_type,
            side_a, side_b, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payload.title)
    .bind(&payload.content)
    .bind(author_id)
    .bind(&community)
    .bind(post_type)
    .bind(side_a)
    .bind(side_b)
    .fetch_one(db)
    .await?;

    Ok(post)
}

pub async fn get_posts(
    db: &PgPool,
    viewer_id: Option<Uuid>,
    community: Option<&str>,
    sort: PostSort,
    limit: u32,
    offset: u32,
) -> Result<Vec<PostListResponse>> {
    // Stored community names are normalized, so the filter must be too or
    // "Foo Bar" would never match the community it refers to.
    let community = community.map(community_service::normalize_name);
    let community = community.as_deref();

    let mut query = r#"
        SELECT
            p.id, p.title, p.community, p.post_type, p.upvotes, p.downvotes, p.created_at,
            u.id as author_id, u.username,
            v.direction as user_vote,
            (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) as comment_count
        FROM posts p
        JOIN users u ON p.author_id = u.id
        LEFT JOIN votes v ON v.post_id = p.id AND v.user_id = $1
    "#
    .to_string();

    let mut param_count = 1;

    if community.is_some() {
        param_count += 1;
        query.push_str(&format!(" WHERE p.community = ${}", param_count));
    }

    let order_clause = match sort {
        PostSort::New => "p.created_at DESC",
        PostSort::Top => "(p.upvotes - p.downvotes) DESC, p.created_at DESC",
    };

    query.push_str(&format!(
        " ORDER BY {} LIMIT ${} OFFSET ${}",
        order_clause,
        param_count + 1,
        param_count + 2
    ));

    let mut query_builder = sqlx::query(&query).bind(viewer_id);

    if let Some(community) = community {
        query_builder = query_builder.bind(community);
    }

    let rows = query_builder
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(db)
        .await?;

    let posts = rows
        .into_iter()
        .map(|row| {
            let upvotes: i32 = row.get("upvotes");
            let downvotes: i32 = row.get("downvotes");

            PostListResponse {
                id: row.get("id"),
                title: row.get("title"),
                author: PostAuthor {
                    id: row.get("author_id"),
                    username: row.get("username"),
                },
                community: row.get("community"),
                post_type: row.get("post_type"),
                upvotes,
                downvotes,
                score: upvotes - downvotes,
                comment_count: row.get("comment_count"),
                created_at: row.get("created_at"),
                user_vote: row.get("user_vote"),
            }
        })
        .collect();

    Ok(posts)
}

pub async fn get_post_by_id(
    db: &PgPool,
    post_id: Uuid,
    viewer_id: Option<Uuid>,
) -> Result<Option<PostResponse>> {
    let row = sqlx::query(
        r#"
        SELECT
            p.id, p.title, p.content, p.community, p.post_type, p.side_a, p.side_b,
            p.upvotes, p.downvotes, p.views, p.created_at,
            u.id as author_id, u.username,
            v.direction as user_vote
        FROM posts p
        JOIN users u ON p.author_id = u.id
        LEFT JOIN votes v ON v.post_id = p.id AND v.user_id = $2
        WHERE p.id = $1
        "#,
    )
    .bind(post_id)
    .bind(viewer_id)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let upvotes: i32 = row.get("upvotes");
    let downvotes: i32 = row.get("downvotes");
    let side_a: Option<String> = row.get("side_a");
    let side_b: Option<String> = row.get("side_b");

    let debate_sides = match (side_a, side_b) {
        (Some(side_a), Some(side_b)) => Some(DebateSides { side_a, side_b }),
        _ => None,
    };

    Ok(Some(PostResponse {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author: PostAuthor {
            id: row.get("author_id"),
            username: row.get("username"),
        },
        community: row.get("community"),
        post_type: row.get("post_type"),
        debate_sides,
        upvotes,
        downvotes,
        score: upvotes - downvotes,
        views: row.get("views"),
        created_at: row.get("created_at"),
        user_vote: row.get("user_vote"),
    }))
}

pub async fn record_post_view(db: &PgPool, post_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE posts SET views = views + 1 WHERE id = $1")
        .bind(post_id)
        .execute(db)
        .await?;

    Ok(())
}

/// Deletes a post and everything that hangs off it: its comments, the votes
/// on the post, and the votes on those comments. All in one transaction so a
/// partial failure cannot strand orphan ledger entries.
pub async fn delete_post(db: &PgPool, caller_id: Uuid, post_id: Uuid) -> Result<()> {
    let post = get_post_by_id_raw(db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if post.author_id != caller_id {
        return Err(AppError::Authorization(
            "You can only delete your own posts".to_string(),
        ));
    }

    let mut tx = db.begin().await?;

    // Votes on the post's comments would become unreachable once the comments
    // are gone, so they go first.
    sqlx::query("DELETE FROM votes WHERE comment_id IN (SELECT id FROM comments WHERE post_id = $1)")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM votes WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM comments WHERE post_id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(%post_id, "post deleted with dependent comments and votes");

    Ok(())
}
