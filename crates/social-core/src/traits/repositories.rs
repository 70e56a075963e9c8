//! Repository traits (ports) - define the interface for data access
//!
//! The service layer programs against these traits; `social-db` provides the
//! PostgreSQL implementations. Every method runs standalone against the
//! implementation's pool. Multi-statement sequences that must be atomic go
//! through the implementation's transaction-aware variants instead.
//!
//! Paged reads compute `total` and `items` with two statements. Run
//! standalone under concurrent writes the two may disagree; the
//! transaction-aware read variants pair them on one snapshot.

use async_trait::async_trait;

use crate::entities::{AggregateCount, Comment, Direction, RelationEdge, RelationKind, RelationState};
use crate::error::DomainError;
use crate::value_objects::{EntityId, Page, PageRequest};

/// Result type for repository operations
pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// Comment Repository (threaded content)
// ============================================================================

#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Find comment by ID
    async fn find_by_id(&self, id: EntityId) -> RepoResult<Option<Comment>>;

    /// Insert a new comment; a set `parent_id` must name a comment on the same post
    async fn create(&self, comment: &Comment) -> RepoResult<()>;

    /// Replace the text of a comment
    async fn update_text(&self, id: EntityId, content: &str) -> RepoResult<Comment>;

    /// Top-level comments of a post, newest first
    ///
    /// `total` is read separately from the window and is not guaranteed to
    /// match it under concurrent writes.
    async fn fetch_top_level(&self, post_id: EntityId, page: PageRequest)
        -> RepoResult<Page<Comment>>;

    /// Replies under a comment, newest first
    ///
    /// The window applies to direct children only. With `include_descendants`
    /// every transitive reply under an in-window child is returned as well.
    async fn fetch_subtree(
        &self,
        comment_id: EntityId,
        include_descendants: bool,
        page: PageRequest,
    ) -> RepoResult<Page<Comment>>;

    /// Direct reply count per comment, aligned to `comment_ids`
    async fn reply_counts(&self, comment_ids: &[EntityId]) -> RepoResult<Vec<i64>>;

    /// Top-level comment count per post, aligned to `post_ids`
    async fn container_counts(&self, post_ids: &[EntityId]) -> RepoResult<Vec<i64>>;

    /// Delete comments (and, by cascade, their replies); returns the ids matched
    async fn delete_by_ids(&self, ids: &[EntityId]) -> RepoResult<Vec<EntityId>>;

    /// Delete an author's comments, optionally only those in `only`
    async fn delete_by_author(
        &self,
        author_id: EntityId,
        only: Option<&[EntityId]>,
    ) -> RepoResult<Vec<EntityId>>;

    /// Delete every comment of the given posts
    async fn delete_by_container(&self, post_ids: &[EntityId]) -> RepoResult<Vec<EntityId>>;
}

// ============================================================================
// Relation Repository (toggleable edges)
// ============================================================================

#[async_trait]
pub trait RelationRepository: Send + Sync {
    /// Insert an edge; fails with `AlreadyExists` if the key is taken
    async fn create(&self, edge: &RelationEdge) -> RepoResult<()>;

    /// Remove an edge; fails with `NotFound` if it is absent
    async fn delete(&self, edge: &RelationEdge) -> RepoResult<()>;

    /// Delete the edge if present, otherwise insert it
    async fn flip(&self, edge: &RelationEdge) -> RepoResult<RelationState>;

    /// Whether any edge `subject -> target` exists
    async fn exists(&self, subject_id: EntityId, target_id: EntityId) -> RepoResult<bool>;

    /// Whether `a -> b` or `b -> a` exists
    async fn exists_either(&self, a: EntityId, b: EntityId) -> RepoResult<bool>;

    /// Kind of the edge `subject -> target`, if any
    async fn find_kind(
        &self,
        subject_id: EntityId,
        target_id: EntityId,
    ) -> RepoResult<Option<RelationKind>>;

    /// Existence of `subject -> target` for each target, aligned to `target_ids`
    async fn batch_exists(
        &self,
        subject_id: EntityId,
        target_ids: &[EntityId],
    ) -> RepoResult<Vec<bool>>;

    /// Edge counts per id, aligned to `ids`
    ///
    /// `Direction::Both` yields `[outgoing, incoming]` per id.
    async fn counts_for(&self, ids: &[EntityId], direction: Direction)
        -> RepoResult<Vec<AggregateCount>>;

    /// Incoming edge counts per target split by kind, one column per `kinds` entry
    async fn kind_counts(
        &self,
        target_ids: &[EntityId],
        kinds: &[RelationKind],
    ) -> RepoResult<Vec<AggregateCount>>;

    /// Edges originating at `subject_id`, newest first
    ///
    /// `total` and the window come from separate statements.
    async fn list_outgoing(
        &self,
        subject_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<RelationEdge>>;

    /// Edges pointing at `target_id`, newest first
    async fn list_incoming(
        &self,
        target_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<RelationEdge>>;

    /// Remove every edge from `subject_id`, and into it when `include_incoming`
    async fn delete_all_for_subject(
        &self,
        subject_id: EntityId,
        include_incoming: bool,
    ) -> RepoResult<u64>;
}
