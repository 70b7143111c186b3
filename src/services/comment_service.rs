use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{Comment, CommentAuthor, CommentResponse, CreateCommentRequest, PostType},
    services::post_service,
};

pub async fn get_comment_by_id_raw(db: &PgPool, comment_id: Uuid) -> Result<Option<Comment>> {
    let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_optional(db)
        .await?;

    Ok(comment)
}

pub async fn create_comment(
    db: &PgPool,
    author_id: Uuid,
    author_username: &str,
    payload: &CreateCommentRequest,
) -> Result<CommentResponse> {
    let post = post_service::get_post_by_id_raw(db, payload.post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    // A side tag only means something under a debate post.
    if payload.debate_side.is_some() && post.post_type != PostType::Debate {
        return Err(AppError::Validation(
            "Debate side is only allowed on debate posts".to_string(),
        ));
    }

    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (id, content, author_id, post_id, debate_side, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payload.content)
    .bind(author_id)
    .bind(payload.post_id)
    .bind(payload.debate_side)
    .fetch_one(db)
    .await?;

    Ok(CommentResponse {
        id: comment.id,
        content: comment.content,
        post_id: comment.post_id,
        author: CommentAuthor {
            id: author_id,
            username: author_username.to_string(),
        },
        debate_side: comment.debate_side,
        upvotes: comment.upvotes,
        downvotes: comment.downvotes,
        score: comment.upvotes - comment.downvotes,
        created_at: comment.created_at,
        user_vote: None,
    })
}

pub async fn get_post_comments(
    db: &PgPool,
    post_id: Uuid,
    viewer_id: Option<Uuid>,
) -> Result<Vec<CommentResponse>> {
    let rows = sqlx::query(
        r#"
        SELECT
            c.id, c.content, c.post_id, c.debate_side, c.upvotes, c.downvotes, c.created_at,
            u.id as author_id, u.username,
            v.direction as user_vote
        FROM comments c
        JOIN users u ON c.author_id = u.id
        LEFT JOIN votes v ON v.comment_id = c.id AND v.user_id = $2
        WHERE c.post_id = $1
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(post_id)
    .bind(viewer_id)
    .fetch_all(db)
    .await?;

    let comments = rows
        .into_iter()
        .map(|row| {
            let upvotes: i32 = row.get("upvotes");
            let downvotes: i32 = row.get("downvotes");

            CommentResponse {
                id: row.get("id"),
                content: row.get("content"),
                post_id: row.get("post_id"),
                author: CommentAuthor {
                    id: row.get("author_id"),
                    username: row.get("username"),
                },
                debate_side: row.get("debate_side"),
                upvotes,
                downvotes,
                score: upvotes - downvotes,
                created_at: row.get("created_at"),
                user_vote: row.get("user_vote"),
            }
        })
        .collect();

    Ok(comments)
}
