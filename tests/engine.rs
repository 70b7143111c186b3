//! Database-backed tests for the vote, membership, and deletion paths. Each
//! test gets its own migrated database from the sqlx test harness.

use sqlx::PgPool;
use uuid::Uuid;

use debatehub::error::AppError;
use debatehub::models::{
    CreateCommentRequest, CreatePostRequest, DebateSide, PostSort, PostType, User, VoteDirection,
    VoteTarget,
};
use debatehub::services::{
    comment_service, community_service, post_service, user_service, vote_service,
};

async fn seed_user(pool: &PgPool, username: &str) -> User {
    user_service::create_user(
        pool,
        username,
        &format!("{username}@example.com"),
        "$2b$12$test.hash.placeholder",
    )
    .await
    .unwrap()
}

async fn seed_post(
    pool: &PgPool,
    author_id: Uuid,
    community: &str,
    post_type: PostType,
) -> debatehub::models::Post {
    let (side_a, side_b) = match post_type {
        PostType::Debate => (Some("Side A".to_string()), Some("Side B".to_string())),
        PostType::Discussion => (None, None),
    };

    post_service::create_post(
        pool,
        author_id,
        &CreatePostRequest {
            title: "A post".to_string(),
            content: "Some content".to_string(),
            community: community.to_string(),
            post_type: Some(post_type),
            side_a,
            side_b,
        },
    )
    .await
    .unwrap()
}

async fn seed_comment(
    pool: &PgPool,
    author: &User,
    post_id: Uuid,
    side: Option<DebateSide>,
) -> Uuid {
    comment_service::create_comment(
        pool,
        author.id,
        &author.username,
        &CreateCommentRequest {
            content: "a comment".to_string(),
            post_id,
            debate_side: side,
        },
    )
    .await
    .unwrap()
    .id
}

async fn count_votes(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM votes")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test]
async fn vote_toggle_and_swap_maintain_counters(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let voter = seed_user(&pool, "voter").await;
    community_service::create_community(&pool, author.id, "general", None)
        .await
        .unwrap();
    let post = seed_post(&pool, author.id, "general", PostType::Discussion).await;
    let target = VoteTarget::Post(post.id);

    // First vote creates the ledger row and increments.
    let res = vote_service::cast_vote(&pool, voter.id, target, VoteDirection::Up)
        .await
        .unwrap();
    assert_eq!(res.applied_direction, Some(VoteDirection::Up));
    assert_eq!((res.upvotes, res.downvotes, res.score), (1, 0, 1));
    assert_eq!(count_votes(&pool).await, 1);

    // Same direction again toggles off and removes the row.
    let res = vote_service::cast_vote(&pool, voter.id, target, VoteDirection::Up)
        .await
        .unwrap();
    assert_eq!(res.applied_direction, None);
    assert_eq!((res.upvotes, res.downvotes), (0, 0));
    assert_eq!(count_votes(&pool).await, 0);

    // Vote down, then swap to up in place: still exactly one row.
    vote_service::cast_vote(&pool, voter.id, target, VoteDirection::Down)
        .await
        .unwrap();
    let res = vote_service::cast_vote(&pool, voter.id, target, VoteDirection::Up)
        .await
        .unwrap();
    assert_eq!(res.applied_direction, Some(VoteDirection::Up));
    assert_eq!((res.upvotes, res.downvotes, res.score), (1, 0, 1));
    assert_eq!(count_votes(&pool).await, 1);
}

#[sqlx::test]
async fn debate_guard_rejects_opposite_side_but_allows_neutral(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let voter = seed_user(&pool, "voter").await;
    community_service::create_community(&pool, author.id, "debates", None)
        .await
        .unwrap();
    let post = seed_post(&pool, author.id, "debates", PostType::Debate).await;

    let side_a_one = seed_comment(&pool, &author, post.id, Some(DebateSide::A)).await;
    let side_a_two = seed_comment(&pool, &author, post.id, Some(DebateSide::A)).await;
    let side_b = seed_comment(&pool, &author, post.id, Some(DebateSide::B)).await;
    let neutral = seed_comment(&pool, &author, post.id, None).await;

    // Commit to side A.
    vote_service::cast_vote(&pool, voter.id, VoteTarget::Comment(side_a_one), VoteDirection::Up)
        .await
        .unwrap();

    // The opposite side is now off limits, and the error names the side held.
    let err = vote_service::cast_vote(&pool, voter.id, VoteTarget::Comment(side_b), VoteDirection::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DebateSideConflict(ref side) if side == "A"));

    // Another comment on the same side is fine.
    vote_service::cast_vote(&pool, voter.id, VoteTarget::Comment(side_a_two), VoteDirection::Up)
        .await
        .unwrap();

    // Neutral comments never trip the guard.
    let res = vote_service::cast_vote(&pool, voter.id, VoteTarget::Comment(neutral), VoteDirection::Up)
        .await
        .unwrap();
    assert_eq!(res.applied_direction, Some(VoteDirection::Up));
}

#[sqlx::test]
async fn cascade_delete_removes_comments_and_votes(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let voter = seed_user(&pool, "voter").await;
    community_service::create_community(&pool, author.id, "general", None)
        .await
        .unwrap();
    let post = seed_post(&pool, author.id, "general", PostType::Discussion).await;
    let comment = seed_comment(&pool, &author, post.id, None).await;

    vote_service::cast_vote(&pool, voter.id, VoteTarget::Post(post.id), VoteDirection::Up)
        .await
        .unwrap();
    vote_service::cast_vote(&pool, voter.id, VoteTarget::Comment(comment), VoteDirection::Down)
        .await
        .unwrap();
    assert_eq!(count_votes(&pool).await, 2);

    post_service::delete_post(&pool, author.id, post.id)
        .await
        .unwrap();

    // Post, its comments, and both classes of votes are all gone.
    assert!(post_service::get_post_by_id_raw(&pool, post.id)
        .await
        .unwrap()
        .is_none());
    assert!(comment_service::get_comment_by_id_raw(&pool, comment)
        .await
        .unwrap()
        .is_none());
    assert_eq!(count_votes(&pool).await, 0);

    // A vote against the vanished post is a silent no-op, not an error.
    let res = vote_service::cast_vote(&pool, voter.id, VoteTarget::Post(post.id), VoteDirection::Up)
        .await
        .unwrap();
    assert_eq!(res.applied_direction, None);
    assert_eq!(count_votes(&pool).await, 0);
}

#[sqlx::test]
async fn unauthorized_delete_leaves_everything_unchanged(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    let intruder = seed_user(&pool, "intruder").await;
    community_service::create_community(&pool, author.id, "general", None)
        .await
        .unwrap();
    let post = seed_post(&pool, author.id, "general", PostType::Discussion).await;
    let comment = seed_comment(&pool, &author, post.id, None).await;

    vote_service::cast_vote(&pool, intruder.id, VoteTarget::Post(post.id), VoteDirection::Up)
        .await
        .unwrap();

    let err = post_service::delete_post(&pool, intruder.id, post.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    let surviving = post_service::get_post_by_id_raw(&pool, post.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(surviving.upvotes, 1);
    assert!(comment_service::get_comment_by_id_raw(&pool, comment)
        .await
        .unwrap()
        .is_some());
    assert_eq!(count_votes(&pool).await, 1);
}

#[sqlx::test]
async fn membership_toggle_round_trip(pool: PgPool) {
    let creator = seed_user(&pool, "creator").await;
    let joiner = seed_user(&pool, "joiner").await;
    let community = community_service::create_community(&pool, creator.id, "rustlang", None)
        .await
        .unwrap();

    // The creator is the first member.
    assert_eq!(community.members_count, 1);

    let res = community_service::toggle_membership(&pool, joiner.id, "rustlang")
        .await
        .unwrap();
    assert!(res.joined);

    let community = community_service::get_community_by_name(&pool, "rustlang")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(community.members_count, 2);

    let joiner_row = user_service::get_user_by_id(&pool, joiner.id)
        .await
        .unwrap()
        .unwrap();
    assert!(joiner_row.joined_communities.contains(&"rustlang".to_string()));

    // The live recount agrees with the counter.
    assert_eq!(
        community_service::count_members_live(&pool, "rustlang")
            .await
            .unwrap(),
        2
    );

    // Toggle again to leave.
    let res = community_service::toggle_membership(&pool, joiner.id, "rustlang")
        .await
        .unwrap();
    assert!(!res.joined);

    let community = community_service::get_community_by_name(&pool, "rustlang")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(community.members_count, 1);

    let joiner_row = user_service::get_user_by_id(&pool, joiner.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!joiner_row.joined_communities.contains(&"rustlang".to_string()));
}

#[sqlx::test]
async fn community_names_collide_after_normalization(pool: PgPool) {
    let creator = seed_user(&pool, "creator").await;

    let community = community_service::create_community(&pool, creator.id, "Foo Bar", None)
        .await
        .unwrap();
    assert_eq!(community.name, "foobar");

    // Any casing or spacing variant of the same canonical name is a conflict.
    let err = community_service::create_community(&pool, creator.id, "FOO bar", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = community_service::create_community(&pool, creator.id, "f o o b a r", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test]
async fn feed_community_filter_accepts_unnormalized_names(pool: PgPool) {
    let author = seed_user(&pool, "author").await;
    community_service::create_community(&pool, author.id, "Foo Bar", None)
        .await
        .unwrap();
    let post = seed_post(&pool, author.id, "foobar", PostType::Discussion).await;

    // The filter goes through the same normalization as every other entry
    // point, so the display form of the name still matches.
    let posts = post_service::get_posts(&pool, None, Some("Foo Bar"), PostSort::New, 20, 0)
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, post.id);
    assert_eq!(posts[0].community, "foobar");

    let posts = post_service::get_posts(&pool, None, Some("nosuchplace"), PostSort::New, 20, 0)
        .await
        .unwrap();
    assert!(posts.is_empty());
}
