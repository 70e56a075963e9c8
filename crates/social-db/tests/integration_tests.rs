//! PostgreSQL integration tests
//!
//! These tests require:
//! - Running PostgreSQL instance
//! - Environment variable: DATABASE_URL
//!
//! Run with: cargo test -p social-db --test integration_tests

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Duration, Utc};
use social_common::ContentConfig;
use social_core::{
    Comment, CommentRepository, Direction, DomainError, EntityId, PageRequest, RelationEdge,
    RelationKind, RelationRepository, RelationSpace, RelationState,
};
use social_db::pool::MIGRATIONS_DIR;
use social_db::{
    create_pool, run_migrations, run_migrations_from, CountRule, DatabaseConfig,
    OrderedBatchAggregator, PgCommentRepository, PgConnection, PgPool, PgRelationRepository,
};

// ============================================================================
// Helpers
// ============================================================================

/// Connect and migrate, or return None when no database is configured
async fn setup() -> Option<PgPool> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: DATABASE_URL not set");
            return None;
        }
    };

    let config = DatabaseConfig {
        url,
        max_connections: 5,
        min_connections: 0,
        ..Default::default()
    };
    let pool = create_pool(&config).await.expect("Failed to connect");
    run_migrations(&pool).await.expect("Failed to migrate");
    Some(pool)
}

/// Ids unique across parallel tests and across runs
fn next_id() -> EntityId {
    static BASE: OnceLock<i64> = OnceLock::new();
    static COUNTER: AtomicI64 = AtomicI64::new(0);

    let base = *BASE.get_or_init(|| {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_micros();
        i64::try_from(micros).unwrap() * 1000
    });
    EntityId::new(base + COUNTER.fetch_add(1, Ordering::SeqCst))
}

async fn seed_actor(pool: &PgPool) -> EntityId {
    let id = next_id();
    sqlx::query("INSERT INTO actors (id) VALUES ($1)")
        .bind(id.into_inner())
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_post(pool: &PgPool, author_id: EntityId) -> EntityId {
    let id = next_id();
    sqlx::query("INSERT INTO posts (id, author_id) VALUES ($1, $2)")
        .bind(id.into_inner())
        .bind(author_id.into_inner())
        .execute(pool)
        .await
        .unwrap();
    id
}

fn at(base: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    base + Duration::minutes(minutes)
}

fn comment_at(
    post_id: EntityId,
    parent_id: Option<EntityId>,
    author_id: EntityId,
    created_at: DateTime<Utc>,
) -> Comment {
    let mut comment = Comment::new(next_id(), post_id, author_id, "hello".to_string());
    comment.parent_id = parent_id;
    comment.created_at = created_at;
    comment.updated_at = created_at;
    comment
}

async fn add_comment(
    repo: &PgCommentRepository,
    post_id: EntityId,
    parent_id: Option<EntityId>,
    author_id: EntityId,
    created_at: DateTime<Utc>,
) -> Comment {
    let comment = comment_at(post_id, parent_id, author_id, created_at);
    repo.create(&comment).await.unwrap();
    comment
}

fn edge_at(
    subject_id: EntityId,
    target_id: EntityId,
    kind: RelationKind,
    created_at: DateTime<Utc>,
) -> RelationEdge {
    let mut edge = RelationEdge::new(subject_id, target_id, kind);
    edge.created_at = created_at;
    edge
}

fn ids(page_items: &[Comment]) -> Vec<EntityId> {
    page_items.iter().map(|c| c.id).collect()
}

async fn set_isolation(conn: &mut PgConnection, level: &str) {
    sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {level}"))
        .execute(conn)
        .await
        .unwrap();
}

// ============================================================================
// Schema
// ============================================================================

#[tokio::test]
async fn test_migrations_from_explicit_dir() {
    let Some(pool) = setup().await else { return };

    run_migrations_from(&pool, Path::new(MIGRATIONS_DIR))
        .await
        .unwrap();

    let missing = Path::new(MIGRATIONS_DIR).join("does-not-exist");
    assert!(run_migrations_from(&pool, &missing).await.is_err());
}

// ============================================================================
// Ordered Batch Aggregation
// ============================================================================

#[tokio::test]
async fn test_reply_counts_preserve_order_and_duplicates() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let base = Utc::now() - Duration::hours(1);

    let x = add_comment(&repo, post, None, author, at(base, 0)).await;
    let y = add_comment(&repo, post, None, author, at(base, 1)).await;
    add_comment(&repo, post, Some(x.id), author, at(base, 2)).await;
    add_comment(&repo, post, Some(x.id), author, at(base, 3)).await;
    add_comment(&repo, post, Some(y.id), author, at(base, 4)).await;

    let unknown = next_id();
    let counts = repo
        .reply_counts(&[x.id, unknown, y.id, x.id])
        .await
        .unwrap();
    assert_eq!(counts, vec![2, 0, 1, 2]);
}

#[tokio::test]
async fn test_aggregate_empty_input_returns_empty() {
    let Some(pool) = setup().await else { return };
    let comments = PgCommentRepository::new(pool.clone());
    let follows = PgRelationRepository::new(pool, RelationSpace::Follows);

    assert!(comments.reply_counts(&[]).await.unwrap().is_empty());
    assert!(comments.container_counts(&[]).await.unwrap().is_empty());
    assert!(follows
        .counts_for(&[], Direction::Both)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_kind_counts_zero_fill() {
    let Some(pool) = setup().await else { return };
    let comments = PgCommentRepository::new(pool.clone());
    let reactions = PgRelationRepository::new(pool.clone(), RelationSpace::Reactions);
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let x = add_comment(&comments, post, None, author, Utc::now()).await;

    for _ in 0..3 {
        let actor = seed_actor(&pool).await;
        reactions.create(&RelationEdge::like(actor, x.id)).await.unwrap();
    }
    for _ in 0..2 {
        let actor = seed_actor(&pool).await;
        reactions.create(&RelationEdge::dislike(actor, x.id)).await.unwrap();
    }

    let unknown = next_id();
    let counts = reactions
        .kind_counts(&[x.id, unknown], &[RelationKind::Like, RelationKind::Dislike])
        .await
        .unwrap();

    assert_eq!(counts.len(), 2);
    assert_eq!(counts[0].subject_id, x.id);
    assert_eq!(counts[0].counts, vec![3, 2]);
    assert_eq!(counts[1].subject_id, unknown);
    assert!(counts[1].is_zero());
}

#[tokio::test]
async fn test_kind_counts_rejects_foreign_kind() {
    let Some(pool) = setup().await else { return };
    let reactions = PgRelationRepository::new(pool, RelationSpace::Reactions);

    let err = reactions
        .kind_counts(&[next_id()], &[RelationKind::Follow])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));
}

#[tokio::test]
async fn test_custom_aggregator_over_pool() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let busy = seed_actor(&pool).await;
    let quiet = seed_actor(&pool).await;
    let post = seed_post(&pool, busy).await;

    for _ in 0..4 {
        add_comment(&repo, post, None, busy, Utc::now()).await;
    }

    let by_author = OrderedBatchAggregator::over("comments", "author_id")
        .rule(CountRule::all("authored"));
    let counts = by_author
        .aggregate(&pool, &[quiet, busy, quiet])
        .await
        .unwrap();

    let values: Vec<i64> = counts.iter().map(|c| c.first()).collect();
    assert_eq!(values, vec![0, 4, 0]);
}

// ============================================================================
// Toggle Relations
// ============================================================================

#[tokio::test]
async fn test_flip_twice_restores_state() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let a = seed_actor(&pool).await;
    let b = seed_actor(&pool).await;
    let edge = RelationEdge::follow(a, b);

    assert!(!follows.exists(a, b).await.unwrap());
    assert_eq!(follows.flip(&edge).await.unwrap(), RelationState::On);
    assert!(follows.exists(a, b).await.unwrap());
    assert_eq!(follows.flip(&edge).await.unwrap(), RelationState::Off);
    assert!(!follows.exists(a, b).await.unwrap());
}

#[tokio::test]
async fn test_flip_changes_polarity() {
    let Some(pool) = setup().await else { return };
    let comments = PgCommentRepository::new(pool.clone());
    let reactions = PgRelationRepository::new(pool.clone(), RelationSpace::Reactions);
    let actor = seed_actor(&pool).await;
    let post = seed_post(&pool, actor).await;
    let c = add_comment(&comments, post, None, actor, Utc::now()).await;

    let state = reactions.flip(&RelationEdge::like(actor, c.id)).await.unwrap();
    assert!(state.is_on());
    assert_eq!(
        reactions.find_kind(actor, c.id).await.unwrap(),
        Some(RelationKind::Like)
    );

    let state = reactions
        .flip(&RelationEdge::dislike(actor, c.id))
        .await
        .unwrap();
    assert!(state.is_on());
    assert_eq!(
        reactions.find_kind(actor, c.id).await.unwrap(),
        Some(RelationKind::Dislike)
    );

    let counts = reactions
        .kind_counts(&[c.id], &[RelationKind::Like, RelationKind::Dislike])
        .await
        .unwrap();
    assert_eq!(counts[0].counts, vec![0, 1]);

    let state = reactions
        .flip(&RelationEdge::dislike(actor, c.id))
        .await
        .unwrap();
    assert_eq!(state, RelationState::Off);
    assert_eq!(reactions.find_kind(actor, c.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_polarity_replacement_rolls_back_as_one_unit() {
    let Some(pool) = setup().await else { return };
    let comments = PgCommentRepository::new(pool.clone());
    let reactions = PgRelationRepository::new(pool.clone(), RelationSpace::Reactions);
    let actor = seed_actor(&pool).await;
    let post = seed_post(&pool, actor).await;
    let c = add_comment(&comments, post, None, actor, Utc::now()).await;
    let base = Utc::now() - Duration::hours(1);

    reactions
        .create(&edge_at(actor, c.id, RelationKind::Like, base))
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    let state = reactions
        .flip_tx(&mut tx, &RelationEdge::dislike(actor, c.id))
        .await
        .unwrap();
    assert_eq!(state, RelationState::On);
    let inside: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM comment_reactions WHERE subject_id = $1 AND target_id = $2 AND kind = 2",
    )
    .bind(actor.into_inner())
    .bind(c.id.into_inner())
    .fetch_one(&mut *tx)
    .await
    .unwrap();
    assert_eq!(inside, 1);
    tx.rollback().await.unwrap();

    // the original edge survives untouched
    let page = reactions
        .list_outgoing(actor, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].kind, RelationKind::Like);
    assert_eq!(page.items[0].created_at.timestamp(), base.timestamp());

    // the pooled path replaces the row and stamps the new edge's time
    let replacement = edge_at(actor, c.id, RelationKind::Dislike, at(base, 30));
    assert!(reactions.flip(&replacement).await.unwrap().is_on());
    let page = reactions
        .list_outgoing(actor, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].kind, RelationKind::Dislike);
    assert_eq!(
        page.items[0].created_at.timestamp(),
        replacement.created_at.timestamp()
    );
}

#[tokio::test]
async fn test_create_duplicate_and_delete_missing() {
    let Some(pool) = setup().await else { return };
    let blocks = PgRelationRepository::new(pool.clone(), RelationSpace::Blocks);
    let a = seed_actor(&pool).await;
    let b = seed_actor(&pool).await;
    let edge = RelationEdge::block(a, b);

    blocks.create(&edge).await.unwrap();
    let err = blocks.create(&edge).await.unwrap_err();
    assert!(err.is_conflict());

    blocks.delete(&edge).await.unwrap();
    let err = blocks.delete(&edge).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_relation_validation() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let a = seed_actor(&pool).await;

    let err = follows.create(&RelationEdge::follow(a, a)).await.unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));

    let err = follows
        .create(&RelationEdge::block(a, seed_actor(&pool).await))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));

    let err = follows
        .create(&RelationEdge::follow(a, next_id()))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidReference(_)));

    let err = follows
        .create(&RelationEdge::follow(EntityId::new(0), a))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidReference(_)));
}

#[tokio::test]
async fn test_batch_exists_aligned_to_targets() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let me = seed_actor(&pool).await;
    let followed = seed_actor(&pool).await;
    let other = seed_actor(&pool).await;
    let stranger = seed_actor(&pool).await;

    follows.create(&RelationEdge::follow(me, followed)).await.unwrap();
    // someone else's edge must not leak into my answers
    follows.create(&RelationEdge::follow(stranger, other)).await.unwrap();

    let result = follows
        .batch_exists(me, &[other, followed, next_id(), followed])
        .await
        .unwrap();
    assert_eq!(result, vec![false, true, false, true]);
}

#[tokio::test]
async fn test_counts_for_each_direction() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let star = seed_actor(&pool).await;
    let fan_a = seed_actor(&pool).await;
    let fan_b = seed_actor(&pool).await;

    follows.create(&RelationEdge::follow(fan_a, star)).await.unwrap();
    follows.create(&RelationEdge::follow(fan_b, star)).await.unwrap();
    follows.create(&RelationEdge::follow(star, fan_a)).await.unwrap();

    let both = follows
        .counts_for(&[star, fan_b, star], Direction::Both)
        .await
        .unwrap();
    assert_eq!(both[0].counts, vec![1, 2]);
    assert_eq!(both[1].counts, vec![1, 0]);
    assert_eq!(both[2], both[0]);

    let incoming = follows
        .counts_for(&[star, fan_a], Direction::Incoming)
        .await
        .unwrap();
    assert_eq!(incoming[0].counts, vec![2]);
    assert_eq!(incoming[1].counts, vec![1]);

    let outgoing = follows
        .counts_for(&[star], Direction::Outgoing)
        .await
        .unwrap();
    assert_eq!(outgoing[0].first(), 1);
}

#[tokio::test]
async fn test_list_edges_newest_first_with_pages() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let me = seed_actor(&pool).await;
    let base = Utc::now() - Duration::hours(1);

    let mut targets = Vec::new();
    for i in 0..5 {
        let target = seed_actor(&pool).await;
        follows
            .create(&edge_at(me, target, RelationKind::Follow, at(base, i)))
            .await
            .unwrap();
        targets.push(target);
    }

    let first = follows
        .list_outgoing(me, PageRequest::new(0, 2))
        .await
        .unwrap();
    assert_eq!(first.total, 5);
    assert!(first.has_more());
    let listed: Vec<EntityId> = first.items.iter().map(|e| e.target_id).collect();
    assert_eq!(listed, vec![targets[4], targets[3]]);

    let last = follows
        .list_outgoing(me, PageRequest::new(4, 2))
        .await
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].target_id, targets[0]);
    assert!(!last.has_more());

    let incoming = follows
        .list_incoming(targets[2], PageRequest::default())
        .await
        .unwrap();
    assert_eq!(incoming.total, 1);
    assert_eq!(incoming.items[0].subject_id, me);
    assert_eq!(incoming.items[0].kind, RelationKind::Follow);

    let nobody = follows
        .list_incoming(me, PageRequest::default())
        .await
        .unwrap();
    assert!(nobody.items.is_empty());
    assert_eq!(nobody.total, 0);
}

#[tokio::test]
async fn test_exists_either_direction() {
    let Some(pool) = setup().await else { return };
    let blocks = PgRelationRepository::new(pool.clone(), RelationSpace::Blocks);
    let a = seed_actor(&pool).await;
    let b = seed_actor(&pool).await;
    let c = seed_actor(&pool).await;

    blocks.create(&RelationEdge::block(b, a)).await.unwrap();

    assert!(blocks.exists_either(a, b).await.unwrap());
    assert!(blocks.exists_either(b, a).await.unwrap());
    assert!(!blocks.exists(a, b).await.unwrap());
    assert!(!blocks.exists_either(a, c).await.unwrap());
}

#[tokio::test]
async fn test_delete_all_for_subject() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let me = seed_actor(&pool).await;
    let a = seed_actor(&pool).await;
    let b = seed_actor(&pool).await;

    follows.create(&RelationEdge::follow(me, a)).await.unwrap();
    follows.create(&RelationEdge::follow(me, b)).await.unwrap();
    follows.create(&RelationEdge::follow(a, me)).await.unwrap();

    assert_eq!(follows.delete_all_for_subject(me, false).await.unwrap(), 2);
    assert!(follows.exists(a, me).await.unwrap());

    assert_eq!(follows.delete_all_for_subject(me, true).await.unwrap(), 1);
    assert!(!follows.exists(a, me).await.unwrap());

    // nothing left; still not an error
    assert_eq!(follows.delete_all_for_subject(me, true).await.unwrap(), 0);
}

#[tokio::test]
async fn test_flip_tx_rolls_back_with_transaction() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let a = seed_actor(&pool).await;
    let b = seed_actor(&pool).await;
    let edge = RelationEdge::follow(a, b);

    let mut tx = pool.begin().await.unwrap();
    assert_eq!(follows.flip_tx(&mut tx, &edge).await.unwrap(), RelationState::On);
    tx.rollback().await.unwrap();
    assert!(!follows.exists(a, b).await.unwrap());

    let mut tx = pool.begin().await.unwrap();
    follows.flip_tx(&mut tx, &edge).await.unwrap();
    follows
        .create_tx(&mut tx, &RelationEdge::follow(b, a))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert!(follows.exists(a, b).await.unwrap());
    assert!(follows.exists(b, a).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_flip_tx_serializes() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let a = seed_actor(&pool).await;
    let b = seed_actor(&pool).await;
    let edge = RelationEdge::follow(a, b);

    let flip = |repo: PgRelationRepository, pool: PgPool, edge: RelationEdge| async move {
        let mut tx = pool.begin().await.unwrap();
        let state = repo.flip_tx(&mut tx, &edge).await.unwrap();
        tx.commit().await.unwrap();
        state
    };

    for _ in 0..10 {
        let (first, second) = tokio::join!(
            flip(follows.clone(), pool.clone(), edge.clone()),
            flip(follows.clone(), pool.clone(), edge.clone()),
        );

        // exactly one insert and one delete
        assert_ne!(first, second);
        assert!(!follows.exists(a, b).await.unwrap());
    }
}

#[tokio::test]
async fn test_flip_tx_requires_read_committed() {
    let Some(pool) = setup().await else { return };
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let a = seed_actor(&pool).await;
    let b = seed_actor(&pool).await;
    let edge = RelationEdge::follow(a, b);

    for level in ["REPEATABLE READ", "SERIALIZABLE"] {
        let mut tx = pool.begin().await.unwrap();
        set_isolation(&mut tx, level).await;
        let err = follows.flip_tx(&mut tx, &edge).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationError(_)), "{level}: {err:?}");
        tx.rollback().await.unwrap();
    }
    assert!(!follows.exists(a, b).await.unwrap());

    let mut tx = pool.begin().await.unwrap();
    set_isolation(&mut tx, "READ COMMITTED").await;
    assert!(follows.flip_tx(&mut tx, &edge).await.unwrap().is_on());
    tx.commit().await.unwrap();
    assert!(follows.exists(a, b).await.unwrap());
}

#[tokio::test]
async fn test_actor_removal_cascades_to_edges_and_comments() {
    let Some(pool) = setup().await else { return };
    let comments = PgCommentRepository::new(pool.clone());
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let gone = seed_actor(&pool).await;
    let stays = seed_actor(&pool).await;
    let post = seed_post(&pool, stays).await;

    follows.create(&RelationEdge::follow(gone, stays)).await.unwrap();
    follows.create(&RelationEdge::follow(stays, gone)).await.unwrap();
    let c = add_comment(&comments, post, None, gone, Utc::now()).await;

    sqlx::query("DELETE FROM actors WHERE id = $1")
        .bind(gone.into_inner())
        .execute(&pool)
        .await
        .unwrap();

    assert!(!follows.exists_either(gone, stays).await.unwrap());
    assert!(comments.find_by_id(c.id).await.unwrap().is_none());
}

// ============================================================================
// Threaded Comments
// ============================================================================

#[tokio::test]
async fn test_create_with_missing_parent_is_rejected() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;

    let orphan = comment_at(post, Some(next_id()), author, Utc::now());
    let err = repo.create(&orphan).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidReference(_)));
    assert!(repo.find_by_id(orphan.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_parent_must_share_post() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post_a = seed_post(&pool, author).await;
    let post_b = seed_post(&pool, author).await;
    let parent = add_comment(&repo, post_a, None, author, Utc::now()).await;

    let stray = comment_at(post_b, Some(parent.id), author, Utc::now());
    let err = repo.create(&stray).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidReference(_)));
}

#[tokio::test]
async fn test_create_rejects_missing_post_and_duplicate_id() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;

    let err = repo
        .create(&comment_at(next_id(), None, author, Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidReference(_)));

    let c = add_comment(&repo, post, None, author, Utc::now()).await;
    let err = repo.create(&c).await.unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_content_validation() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::with_config(
        pool.clone(),
        &ContentConfig {
            comment_max_length: 5,
        },
    );
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;

    let mut blank = comment_at(post, None, author, Utc::now());
    blank.content = "   ".to_string();
    let err = repo.create(&blank).await.unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));

    let mut long = comment_at(post, None, author, Utc::now());
    long.content = "toolong".to_string();
    let err = repo.create(&long).await.unwrap_err();
    assert!(err.is_validation());

    let ok = add_comment(&repo, post, None, author, Utc::now()).await;
    let err = repo.update_text(ok.id, "").await.unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));
}

#[tokio::test]
async fn test_update_text() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let c = add_comment(&repo, post, None, author, Utc::now() - Duration::hours(1)).await;

    let updated = repo.update_text(c.id, "edited").await.unwrap();
    assert_eq!(updated.content, "edited");
    assert!(updated.is_edited());

    let err = repo.update_text(next_id(), "edited").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_fetch_top_level_newest_first() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let base = Utc::now() - Duration::hours(1);

    let oldest = add_comment(&repo, post, None, author, at(base, 0)).await;
    let middle = add_comment(&repo, post, None, author, at(base, 1)).await;
    let newest = add_comment(&repo, post, None, author, at(base, 2)).await;
    add_comment(&repo, post, Some(middle.id), author, at(base, 3)).await;

    let page = repo
        .fetch_top_level(post, PageRequest::new(0, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(ids(&page.items), vec![newest.id, middle.id]);
    assert!(page.has_more());

    let rest = repo
        .fetch_top_level(post, PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(ids(&rest.items), vec![oldest.id]);

    let empty_post = seed_post(&pool, author).await;
    assert_eq!(
        repo.container_counts(&[post, empty_post]).await.unwrap(),
        vec![3, 0]
    );
}

#[tokio::test]
async fn test_fetch_top_level_window_of_ten() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let base = Utc::now() - Duration::hours(1);

    let mut created = Vec::new();
    for i in 0..10 {
        created.push(add_comment(&repo, post, None, author, at(base, i)).await);
    }

    let page = repo
        .fetch_top_level(post, PageRequest::new(3, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 10);
    // 4th and 5th newest
    assert_eq!(ids(&page.items), vec![created[6].id, created[5].id]);
    assert!(page.has_more());
}

#[tokio::test]
async fn test_paged_reads_share_transaction_snapshot() {
    let Some(pool) = setup().await else { return };
    let comments = PgCommentRepository::new(pool.clone());
    let follows = PgRelationRepository::new(pool.clone(), RelationSpace::Follows);
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let base = Utc::now() - Duration::hours(1);

    let root = add_comment(&comments, post, None, author, at(base, 0)).await;
    add_comment(&comments, post, None, author, at(base, 1)).await;
    add_comment(&comments, post, Some(root.id), author, at(base, 2)).await;
    let followee = seed_actor(&pool).await;
    follows
        .create(&RelationEdge::follow(author, followee))
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    set_isolation(&mut tx, "REPEATABLE READ").await;

    let top = comments
        .fetch_top_level_tx(&mut tx, post, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(top.total, 2);
    assert_eq!(top.items.len(), 2);

    // committed outside the snapshot
    add_comment(&comments, post, None, author, at(base, 3)).await;
    add_comment(&comments, post, Some(root.id), author, at(base, 4)).await;
    follows
        .create(&RelationEdge::follow(author, seed_actor(&pool).await))
        .await
        .unwrap();

    let top = comments
        .fetch_top_level_tx(&mut tx, post, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(top.total, 2);
    assert_eq!(top.items.len(), 2);

    let replies = comments
        .fetch_subtree_tx(&mut tx, root.id, true, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(replies.total, 1);
    assert_eq!(replies.items.len(), 1);

    let following = follows
        .list_outgoing_tx(&mut tx, author, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(following.total, 1);
    assert_eq!(following.items[0].target_id, followee);

    let followers = follows
        .list_incoming_tx(&mut tx, followee, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(followers.total, 1);
    tx.commit().await.unwrap();

    let top = comments
        .fetch_top_level(post, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(top.total, 3);
    assert_eq!(top.items.len(), 3);
    let following = follows
        .list_outgoing(author, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(following.total, 2);
}

#[tokio::test]
async fn test_fetch_subtree_windows_direct_children() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let base = Utc::now() - Duration::hours(1);

    let root = add_comment(&repo, post, None, author, at(base, 0)).await;
    let child_old = add_comment(&repo, post, Some(root.id), author, at(base, 1)).await;
    let child_new = add_comment(&repo, post, Some(root.id), author, at(base, 2)).await;
    let grandchild = add_comment(&repo, post, Some(child_new.id), author, at(base, 3)).await;
    let great = add_comment(&repo, post, Some(grandchild.id), author, at(base, 4)).await;
    let under_old = add_comment(&repo, post, Some(child_old.id), author, at(base, 5)).await;

    let direct = repo
        .fetch_subtree(root.id, false, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(direct.total, 2);
    assert_eq!(ids(&direct.items), vec![child_new.id, child_old.id]);

    // first direct child only, plus everything below it
    let windowed = repo
        .fetch_subtree(root.id, true, PageRequest::new(0, 1))
        .await
        .unwrap();
    assert_eq!(windowed.total, 2);
    let mut got = ids(&windowed.items);
    got.sort();
    let mut expected = vec![child_new.id, grandchild.id, great.id];
    expected.sort();
    assert_eq!(got, expected);
    assert!(!windowed.items.iter().any(|c| c.id == under_old.id));

    let all = repo
        .fetch_subtree(root.id, true, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all.items.len(), 5);
}

#[tokio::test]
async fn test_fetch_subtree_of_leaf_or_missing_is_empty() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let leaf = add_comment(&repo, post, None, author, Utc::now()).await;

    for id in [leaf.id, next_id()] {
        let page = repo
            .fetch_subtree(id, true, PageRequest::default())
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
    }
}

#[tokio::test]
async fn test_delete_cascades_to_subtree_and_reactions() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let reactions = PgRelationRepository::new(pool.clone(), RelationSpace::Reactions);
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;

    let root = add_comment(&repo, post, None, author, Utc::now()).await;
    let child = add_comment(&repo, post, Some(root.id), author, Utc::now()).await;
    let grandchild = add_comment(&repo, post, Some(child.id), author, Utc::now()).await;
    reactions
        .create(&RelationEdge::like(author, grandchild.id))
        .await
        .unwrap();

    let deleted = repo.delete_by_ids(&[root.id, next_id()]).await.unwrap();
    assert_eq!(deleted, vec![root.id]);

    assert!(repo.find_by_id(child.id).await.unwrap().is_none());
    assert!(repo.find_by_id(grandchild.id).await.unwrap().is_none());
    assert!(!reactions.exists(author, grandchild.id).await.unwrap());

    assert!(repo.delete_by_ids(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_by_author() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let other = seed_actor(&pool).await;
    let silent = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;

    let a1 = add_comment(&repo, post, None, author, Utc::now()).await;
    let a2 = add_comment(&repo, post, None, author, Utc::now()).await;
    let o1 = add_comment(&repo, post, None, other, Utc::now()).await;

    // no comments is not an error
    assert!(repo.delete_by_author(silent, None).await.unwrap().is_empty());
    assert!(repo
        .delete_by_author(author, Some(&[]))
        .await
        .unwrap()
        .is_empty());

    // ids owned by someone else are left alone
    let deleted = repo
        .delete_by_author(author, Some(&[a1.id, o1.id]))
        .await
        .unwrap();
    assert_eq!(deleted, vec![a1.id]);
    assert!(repo.find_by_id(o1.id).await.unwrap().is_some());

    let deleted = repo.delete_by_author(author, None).await.unwrap();
    assert_eq!(deleted, vec![a2.id]);
}

#[tokio::test]
async fn test_delete_by_container() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let kept_post = seed_post(&pool, author).await;

    let root = add_comment(&repo, post, None, author, Utc::now()).await;
    add_comment(&repo, post, Some(root.id), author, Utc::now()).await;
    let kept = add_comment(&repo, kept_post, None, author, Utc::now()).await;

    let deleted = repo.delete_by_container(&[post]).await.unwrap();
    assert_eq!(deleted.len(), 2);
    assert!(deleted.contains(&root.id));
    assert_eq!(repo.container_counts(&[post]).await.unwrap(), vec![0]);
    assert!(repo.find_by_id(kept.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_comment_writes_join_caller_transaction() {
    let Some(pool) = setup().await else { return };
    let repo = PgCommentRepository::new(pool.clone());
    let author = seed_actor(&pool).await;
    let post = seed_post(&pool, author).await;
    let c = comment_at(post, None, author, Utc::now());

    let mut tx = pool.begin().await.unwrap();
    repo.create_tx(&mut tx, &c).await.unwrap();
    let updated = repo.update_text_tx(&mut tx, c.id, "draft").await.unwrap();
    assert_eq!(updated.content, "draft");
    tx.rollback().await.unwrap();
    assert!(repo.find_by_id(c.id).await.unwrap().is_none());

    let mut tx = pool.begin().await.unwrap();
    repo.create_tx(&mut tx, &c).await.unwrap();
    let deleted = repo.delete_by_ids_tx(&mut tx, &[c.id]).await.unwrap();
    assert_eq!(deleted, vec![c.id]);
    assert!(repo
        .delete_by_author_tx(&mut tx, author, None)
        .await
        .unwrap()
        .is_empty());
    assert!(repo
        .delete_by_container_tx(&mut tx, &[post])
        .await
        .unwrap()
        .is_empty());
    tx.commit().await.unwrap();
    assert!(repo.find_by_id(c.id).await.unwrap().is_none());
}
