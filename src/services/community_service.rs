use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, Result, is_unique_violation},
    models::{Community, MembershipResponse},
};

/// Canonical community name: lowercased, trimmed, internal whitespace
/// stripped. "Foo Bar" and "foobar" address the same community.
pub fn normalize_name(raw: &str) -> String {
    raw.to_lowercase().split_whitespace().collect()
}

/// Length limits apply to characters, not bytes, so multibyte names are
/// measured the way a user would count them.
fn check_name_length(name: &str) -> Result<()> {
    let chars = name.chars().count();

    if chars < 3 {
        return Err(AppError::Validation(
            "Community name too short after formatting".to_string(),
        ));
    }
    if chars > 20 {
        return Err(AppError::Validation(
            "Community name must be at most 20 characters".to_string(),
        ));
    }

    Ok(())
}

pub async fn get_community_by_name(db: &PgPool, name: &str) -> Result<Option<Community>> {
    let community = sqlx::query_as::<_, Community>("SELECT * FROM communities WHERE name = $1")
        .bind(name)
        .fetch_optional(db)
        .await?;

    Ok(community)
}

pub async fn get_communities(db: &PgPool, limit: u32, offset: u32) -> Result<Vec<Community>> {
    let communities = sqlx::query_as::<_, Community>(
        "SELECT * FROM communities ORDER BY members_count DESC, created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(db)
    .await?;

    Ok(communities)
}

/// Creates a community and auto-joins its creator. The counter starts at 1,
/// already counting the creator, so the join here must not increment it
/// again.
pub async fn create_community(
    db: &PgPool,
    creator_id: Uuid,
    raw_name: &str,
    description: Option<&str>,
) -> Result<Community> {
    let name = normalize_name(raw_name);

    check_name_length(&name)?;

    if get_community_by_name(db, &name).await?.is_some() {
        return Err(AppError::Conflict("Community already exists".to_string()));
    }

    let mut tx = db.begin().await?;

    // The existence check above races with concurrent creates; the unique
    // constraint on the name settles it.
    let community = sqlx::query_as::<_, Community>(
        r#"
        INSERT INTO communities (id, name, description, created_by, members_count, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 1, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .bind(description)
    .bind(creator_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Community already exists".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    sqlx::query(
        r#"
        UPDATE users
        SET joined_communities = array_append(joined_communities, $1), updated_at = NOW()
        WHERE id = $2 AND NOT ($1 = ANY(joined_communities))
        "#,
    )
    .bind(&name)
    .bind(creator_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(community)
}

/// Joins the community if the user is not a member, leaves it otherwise. The
/// user's joined-set and the community's member counter move together in one
/// transaction.
///
/// Toggling a community that does not exist is a no-op: joining is not
/// auto-creation.
pub async fn toggle_membership(
    db: &PgPool,
    user_id: Uuid,
    name: &str,
) -> Result<MembershipResponse> {
    let mut tx = db.begin().await?;

    let joined_set: Vec<String> =
        sqlx::query_scalar("SELECT joined_communities FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let is_member = joined_set.iter().any(|c| c == name);

    let community_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM communities WHERE name = $1")
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(community_id) = community_id else {
        tracing::debug!(community = name, "membership toggle on missing community ignored");
        tx.rollback().await?;
        return Ok(MembershipResponse {
            community: name.to_string(),
            joined: is_member,
        });
    };

    let joined = if is_member {
        sqlx::query(
            r#"
            UPDATE users
            SET joined_communities = array_remove(joined_communities, $1), updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(name)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE communities SET members_count = members_count - 1, updated_at = NOW() \
             WHERE id = $1 AND members_count > 0",
        )
        .bind(community_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tracing::error!(
                community = name,
                "members_count already at zero while a member was leaving; counter has drifted"
            );
        }

        false
    } else {
        sqlx::query(
            r#"
            UPDATE users
            SET joined_communities = array_append(joined_communities, $1), updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(name)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE communities SET members_count = members_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(community_id)
        .execute(&mut *tx)
        .await?;

        true
    };

    tx.commit().await?;

    Ok(MembershipResponse {
        community: name.to_string(),
        joined,
    })
}

/// Recomputes the member count from the authoritative per-user joined-sets,
/// bypassing the denormalized counter. Read-side safety net against counter
/// drift.
pub async fn count_members_live(db: &PgPool, name: &str) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE $1 = ANY(joined_communities)")
            .bind(name)
            .fetch_one(db)
            .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_name("Foo Bar"), "foobar");
        assert_eq!(normalize_name("  RustLang  "), "rustlang");
        assert_eq!(normalize_name("My  Cool\tPlace"), "mycoolplace");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_name("Foo Bar");
        assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn casing_and_spacing_variants_collide() {
        assert_eq!(normalize_name("Foo Bar"), normalize_name("FOOBAR"));
        assert_eq!(normalize_name("foo bar"), normalize_name("f o o b a r"));
    }

    #[test]
    fn short_names_shrink_below_minimum() {
        // "a b" normalizes to "ab", which create_community rejects.
        assert!(check_name_length(&normalize_name("a b")).is_err());
        assert!(check_name_length(&normalize_name("   x   ")).is_err());
    }

    #[test]
    fn length_limits_count_characters_not_bytes() {
        // "éé" is 4 bytes but only 2 characters: still too short.
        assert!(matches!(
            check_name_length("éé"),
            Err(AppError::Validation(_))
        ));

        // 20 accented characters is 40 bytes but within the limit.
        let twenty = "é".repeat(20);
        assert!(check_name_length(&twenty).is_ok());

        let twenty_one = "é".repeat(21);
        assert!(matches!(
            check_name_length(&twenty_one),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn ascii_boundaries_unchanged() {
        assert!(check_name_length("ab").is_err());
        assert!(check_name_length("abc").is_ok());
        assert!(check_name_length(&"a".repeat(20)).is_ok());
        assert!(check_name_length(&"a".repeat(21)).is_err());
    }
}
