use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, Result, is_foreign_key_violation},
    models::{DebateSide, PostType, Vote, VoteDirection, VoteResponse, VoteTarget},
};

fn no_op_response() -> VoteResponse {
    VoteResponse {
        applied_direction: None,
        upvotes: 0,
        downvotes: 0,
        score: 0,
    }
}

/// One step of the per-(user, target) vote state machine. Returns the next
/// state together with the signed counter deltas that make the denormalized
/// `upvotes`/`downvotes` columns track the ledger:
///
/// - no vote + request        -> vote created, +1 on the requested side
/// - same direction again     -> toggle off, -1 on that side
/// - opposite direction       -> swap in place, -1 old side, +1 new side
pub fn vote_transition(
    current: Option<VoteDirection>,
    requested: VoteDirection,
) -> (Option<VoteDirection>, i32, i32) {
    match (current, requested) {
        (None, VoteDirection::Up) => (Some(VoteDirection::Up), 1, 0),
        (None, VoteDirection::Down) => (Some(VoteDirection::Down), 0, 1),
        (Some(VoteDirection::Up), VoteDirection::Up) => (None, -1, 0),
        (Some(VoteDirection::Down), VoteDirection::Down) => (None, 0, -1),
        (Some(VoteDirection::Up), VoteDirection::Down) => (Some(VoteDirection::Down), -1, 1),
        (Some(VoteDirection::Down), VoteDirection::Up) => (Some(VoteDirection::Up), 1, -1),
    }
}

/// Records a vote by `user_id` on a post or comment and keeps the target's
/// counters in sync with the ledger.
///
/// A vote on a target that no longer exists is a silent no-op rather than an
/// error, since the caller's view may be stale.
pub async fn cast_vote(
    db: &PgPool,
    user_id: Uuid,
    target: VoteTarget,
    direction: VoteDirection,
) -> Result<VoteResponse> {
    // Resolve the target; for comments this also gives the debate guard its
    // inputs (parent post type and the comment's side).
    match target {
        VoteTarget::Post(post_id) => {
            let exists = sqlx::query("SELECT id FROM posts WHERE id = $1")
                .bind(post_id)
                .fetch_optional(db)
                .await?;

            if exists.is_none() {
                tracing::debug!(%post_id, "vote on missing post ignored");
                return Ok(no_op_response());
            }
        }
        VoteTarget::Comment(comment_id) => {
            let row = sqlx::query(
                r#"
                SELECT c.post_id, c.debate_side, p.post_type
                FROM comments c
                JOIN posts p ON c.post_id = p.id
                WHERE c.id = $1
                "#,
            )
            .bind(comment_id)
            .fetch_optional(db)
            .await?;

            let Some(row) = row else {
                tracing::debug!(%comment_id, "vote on missing comment ignored");
                return Ok(no_op_response());
            };

            let post_id: Uuid = row.get("post_id");
            let side: Option<DebateSide> = row.get("debate_side");
            let post_type: PostType = row.get("post_type");

            // Neutral comments and comments on discussion posts skip the
            // exclusivity check entirely.
            if post_type == PostType::Debate {
                if let Some(side) = side {
                    check_debate_exclusivity(db, user_id, post_id, side).await?;
                }
            }
        }
    }

    let mut tx = db.begin().await?;

    let existing = lock_vote(&mut tx, user_id, target).await?;

    let (applied, up_delta, down_delta) = match existing {
        Some(vote) => apply_to_existing(&mut tx, &vote, direction).await?,
        None => {
            match try_insert_vote(&mut tx, user_id, target, direction).await {
                Ok(true) => vote_transition(None, direction),
                Ok(false) => {
                    // Lost a concurrent first-vote race: the unique index kept
                    // the winner's row, so switch to the update path against it.
                    let winner = lock_vote(&mut tx, user_id, target).await?.ok_or_else(|| {
                        AppError::Internal("vote row missing after conflict".to_string())
                    })?;
                    apply_to_existing(&mut tx, &winner, direction).await?
                }
                // The target was deleted between the existence check and the
                // insert; same outcome as a target that never resolved.
                Err(AppError::Database(ref e)) if is_foreign_key_violation(e) => {
                    tracing::debug!("vote target deleted mid-flight, ignored");
                    tx.rollback().await?;
                    return Ok(no_op_response());
                }
                Err(e) => return Err(e),
            }
        }
    };

    // The counter update can come back empty if a concurrent delete removed
    // the target after our ledger write; the delete's cascade purges that
    // write too, so drop the whole transaction and report no vote.
    let Some((upvotes, downvotes)) =
        apply_counter_deltas(&mut tx, target, up_delta, down_delta).await?
    else {
        tracing::debug!("vote target deleted mid-flight, ignored");
        tx.rollback().await?;
        return Ok(no_op_response());
    };

    tx.commit().await?;

    Ok(VoteResponse {
        applied_direction: applied,
        upvotes,
        downvotes,
        score: upvotes - downvotes,
    })
}

/// Looks up the caller's vote the user already holds within the same debate,
/// joined back to each sibling comment's side. A prior vote on the opposite
/// side rejects the request, naming the side already backed.
///
/// This is a check-then-act sequence without a storage constraint behind it;
/// two concurrent opposite-side votes can both pass. Accepted as a soft
/// constraint: the violation is cosmetic, not a security issue.
async fn check_debate_exclusivity(
    db: &PgPool,
    user_id: Uuid,
    post_id: Uuid,
    side: DebateSide,
) -> Result<()> {
    let committed_side: Option<DebateSide> = sqlx::query_scalar(
        r#"
        SELECT c.debate_side
        FROM votes v
        JOIN comments c ON v.comment_id = c.id
        WHERE v.user_id = $1
          AND c.post_id = $2
          AND c.debate_side IS NOT NULL
          AND c.debate_side <> $3
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(post_id)
    .bind(side)
    .fetch_optional(db)
    .await?;

    match committed_side {
        Some(prior) => Err(AppError::DebateSideConflict(prior.to_string())),
        None => Ok(()),
    }
}

async fn lock_vote(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    target: VoteTarget,
) -> Result<Option<Vote>> {
    let (query, target_id) = match target {
        VoteTarget::Post(id) => (
            "SELECT * FROM votes WHERE user_id = $1 AND post_id = $2 FOR UPDATE",
            id,
        ),
        VoteTarget::Comment(id) => (
            "SELECT * FROM votes WHERE user_id = $1 AND comment_id = $2 FOR UPDATE",
            id,
        ),
    };

    let vote = sqlx::query_as::<_, Vote>(query)
        .bind(user_id)
        .bind(target_id)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(vote)
}

/// First vote on a target. The partial unique index on (user, target) is the
/// real arbiter here: under a concurrent duplicate exactly one insert lands,
/// and the loser sees zero rows affected.
async fn try_insert_vote(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    target: VoteTarget,
    direction: VoteDirection,
) -> Result<bool> {
    let (query, target_id) = match target {
        VoteTarget::Post(id) => (
            r#"
            INSERT INTO votes (id, user_id, post_id, direction, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (user_id, post_id) WHERE post_id IS NOT NULL DO NOTHING
            "#,
            id,
        ),
        VoteTarget::Comment(id) => (
            r#"
            INSERT INTO votes (id, user_id, comment_id, direction, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (user_id, comment_id) WHERE comment_id IS NOT NULL DO NOTHING
            "#,
            id,
        ),
    };

    let result = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(target_id)
        .bind(direction)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Applies the requested direction against an existing ledger entry: toggle
/// off deletes the row, a direction change updates it in place.
async fn apply_to_existing(
    tx: &mut Transaction<'_, Postgres>,
    vote: &Vote,
    requested: VoteDirection,
) -> Result<(Option<VoteDirection>, i32, i32)> {
    let (next, up_delta, down_delta) = vote_transition(Some(vote.direction), requested);

    match next {
        None => {
            sqlx::query("DELETE FROM votes WHERE id = $1")
                .bind(vote.id)
                .execute(&mut **tx)
                .await?;
        }
        Some(direction) => {
            sqlx::query("UPDATE votes SET direction = $1, updated_at = NOW() WHERE id = $2")
                .bind(direction)
                .bind(vote.id)
                .execute(&mut **tx)
                .await?;
        }
    }

    Ok((next, up_delta, down_delta))
}

/// Applies a signed delta pair to the target's counters as a single atomic
/// increment, so concurrent voters on the same target never lose updates.
///
/// Counters can only underflow if they have already drifted from the ledger;
/// that case is clamped to zero and reported to the operator, never to the
/// end user.
async fn apply_counter_deltas(
    tx: &mut Transaction<'_, Postgres>,
    target: VoteTarget,
    up_delta: i32,
    down_delta: i32,
) -> Result<Option<(i32, i32)>> {
    let (table, target_id) = match target {
        VoteTarget::Post(id) => ("posts", id),
        VoteTarget::Comment(id) => ("comments", id),
    };

    let query = format!(
        "UPDATE {table} SET upvotes = upvotes + $1, downvotes = downvotes + $2, \
         updated_at = NOW() WHERE id = $3 RETURNING upvotes, downvotes"
    );

    let Some(row) = sqlx::query(&query)
        .bind(up_delta)
        .bind(down_delta)
        .bind(target_id)
        .fetch_optional(&mut **tx)
        .await?
    else {
        // Target row gone, a concurrent delete won the race.
        return Ok(None);
    };

    let mut upvotes: i32 = row.get("upvotes");
    let mut downvotes: i32 = row.get("downvotes");

    if upvotes < 0 || downvotes < 0 {
        tracing::error!(
            table,
            %target_id,
            upvotes,
            downvotes,
            "vote counter underflow, ledger and counters have drifted; clamping to zero"
        );

        let clamp = format!(
            "UPDATE {table} SET upvotes = GREATEST(upvotes, 0), downvotes = GREATEST(downvotes, 0) \
             WHERE id = $1 RETURNING upvotes, downvotes"
        );

        let row = sqlx::query(&clamp)
            .bind(target_id)
            .fetch_one(&mut **tx)
            .await?;

        upvotes = row.get("upvotes");
        downvotes = row.get("downvotes");
    }

    Ok(Some((upvotes, downvotes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_vote_creates_and_increments() {
        assert_eq!(
            vote_transition(None, VoteDirection::Up),
            (Some(VoteDirection::Up), 1, 0)
        );
        assert_eq!(
            vote_transition(None, VoteDirection::Down),
            (Some(VoteDirection::Down), 0, 1)
        );
    }

    #[test]
    fn same_direction_toggles_off() {
        assert_eq!(
            vote_transition(Some(VoteDirection::Up), VoteDirection::Up),
            (None, -1, 0)
        );
        assert_eq!(
            vote_transition(Some(VoteDirection::Down), VoteDirection::Down),
            (None, 0, -1)
        );
    }

    #[test]
    fn opposite_direction_swaps_in_place() {
        assert_eq!(
            vote_transition(Some(VoteDirection::Up), VoteDirection::Down),
            (Some(VoteDirection::Down), -1, 1)
        );
        assert_eq!(
            vote_transition(Some(VoteDirection::Down), VoteDirection::Up),
            (Some(VoteDirection::Up), 1, -1)
        );
    }

    #[test]
    fn toggle_round_trip_restores_counters() {
        // Vote then toggle off: the deltas must cancel exactly.
        for direction in [VoteDirection::Up, VoteDirection::Down] {
            let (state, du1, dd1) = vote_transition(None, direction);
            let (state, du2, dd2) = vote_transition(state, direction);
            assert_eq!(state, None);
            assert_eq!(du1 + du2, 0);
            assert_eq!(dd1 + dd2, 0);
        }
    }

    #[test]
    fn swap_moves_exactly_one_between_counters() {
        // A swap never changes one counter by 2 and the other by 0.
        let (_, du, dd) = vote_transition(Some(VoteDirection::Up), VoteDirection::Down);
        assert_eq!((du, dd), (-1, 1));
        assert_eq!(du + dd, 0);

        let (_, du, dd) = vote_transition(Some(VoteDirection::Down), VoteDirection::Up);
        assert_eq!((du, dd), (1, -1));
        assert_eq!(du + dd, 0);
    }

    #[test]
    fn score_never_drifts_under_sequential_votes() {
        // Replay an arbitrary request sequence for one (user, target) pair and
        // check the running counters always match the ledger state.
        let requests = [
            VoteDirection::Up,
            VoteDirection::Up,
            VoteDirection::Down,
            VoteDirection::Up,
            VoteDirection::Up,
            VoteDirection::Down,
            VoteDirection::Down,
        ];

        let mut state = None;
        let mut upvotes = 0;
        let mut downvotes = 0;

        for requested in requests {
            let (next, du, dd) = vote_transition(state, requested);
            state = next;
            upvotes += du;
            downvotes += dd;

            let expected_up = i32::from(state == Some(VoteDirection::Up));
            let expected_down = i32::from(state == Some(VoteDirection::Down));
            assert_eq!(upvotes, expected_up);
            assert_eq!(downvotes, expected_down);
            assert!(upvotes >= 0 && downvotes >= 0);
        }
    }
}
