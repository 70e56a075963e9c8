//! PostgreSQL implementation of CommentRepository

use async_trait::async_trait;
use social_common::ContentConfig;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use tracing::{debug, instrument};

use social_core::entities::Comment;
use social_core::error::DomainError;
use social_core::traits::{CommentRepository, RepoResult};
use social_core::value_objects::{EntityId, Page, PageRequest};

use crate::aggregate::{Condition, CountRule, OrderedBatchAggregator};
use crate::mappers::CommentInsert;
use crate::models::CommentModel;

use super::error::{map_db_error, map_write_error};

/// PostgreSQL implementation of CommentRepository
///
/// Comments form a flat table keyed by id with a nullable parent pointer.
/// Subtrees are read with a recursive CTE and removed by the
/// `ON DELETE CASCADE` on the parent foreign key; nothing here walks the tree.
#[derive(Clone)]
pub struct PgCommentRepository {
    pool: PgPool,
    max_content_length: usize,
    replies: OrderedBatchAggregator,
    top_level: OrderedBatchAggregator,
}

impl PgCommentRepository {
    /// Create a new PgCommentRepository with default content limits
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, &ContentConfig::default())
    }

    /// Create a new PgCommentRepository with explicit content limits
    pub fn with_config(pool: PgPool, content: &ContentConfig) -> Self {
        Self {
            pool,
            max_content_length: content.comment_max_length,
            replies: OrderedBatchAggregator::over("comments", "parent_id")
                .rule(CountRule::all("replies")),
            top_level: OrderedBatchAggregator::over("comments", "post_id")
                .also_join(Condition::IsNull("parent_id"))
                .rule(CountRule::all("top_level")),
        }
    }

    /// Insert a comment on a caller-supplied connection
    #[instrument(skip(self, conn, comment), fields(comment_id = %comment.id, post_id = %comment.post_id))]
    pub async fn create_tx(&self, conn: &mut PgConnection, comment: &Comment) -> RepoResult<()> {
        self.insert(&mut *conn, comment).await
    }

    /// Replace comment text on a caller-supplied connection
    #[instrument(skip(self, conn, content))]
    pub async fn update_text_tx(
        &self,
        conn: &mut PgConnection,
        id: EntityId,
        content: &str,
    ) -> RepoResult<Comment> {
        self.set_text(&mut *conn, id, content).await
    }

    /// Delete comments by id on a caller-supplied connection
    #[instrument(skip(self, conn))]
    pub async fn delete_by_ids_tx(
        &self,
        conn: &mut PgConnection,
        ids: &[EntityId],
    ) -> RepoResult<Vec<EntityId>> {
        self.remove_by_ids(&mut *conn, ids).await
    }

    /// Delete an author's comments on a caller-supplied connection
    #[instrument(skip(self, conn))]
    pub async fn delete_by_author_tx(
        &self,
        conn: &mut PgConnection,
        author_id: EntityId,
        only: Option<&[EntityId]>,
    ) -> RepoResult<Vec<EntityId>> {
        self.remove_by_author(&mut *conn, author_id, only).await
    }

    /// Delete all comments of posts on a caller-supplied connection
    #[instrument(skip(self, conn))]
    pub async fn delete_by_container_tx(
        &self,
        conn: &mut PgConnection,
        post_ids: &[EntityId],
    ) -> RepoResult<Vec<EntityId>> {
        self.remove_by_container(&mut *conn, post_ids).await
    }

    /// Page a post's top-level comments on a caller-supplied connection
    ///
    /// Total and items come from two statements; inside a REPEATABLE READ
    /// transaction both see the same snapshot.
    #[instrument(skip(self, conn))]
    pub async fn fetch_top_level_tx(
        &self,
        conn: &mut PgConnection,
        post_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<Comment>> {
        self.top_level_page(conn, post_id, page).await
    }

    /// Page a comment's replies on a caller-supplied connection
    #[instrument(skip(self, conn))]
    pub async fn fetch_subtree_tx(
        &self,
        conn: &mut PgConnection,
        comment_id: EntityId,
        include_descendants: bool,
        page: PageRequest,
    ) -> RepoResult<Page<Comment>> {
        self.subtree_page(conn, comment_id, include_descendants, page)
            .await
    }

    fn validate_new(&self, comment: &Comment) -> RepoResult<()> {
        if comment.id.is_zero() {
            return Err(DomainError::ValidationError("comment id must be set".to_string()));
        }
        if comment.post_id.is_zero() || comment.author_id.is_zero() {
            return Err(DomainError::InvalidReference(
                "post and author ids must be set".to_string(),
            ));
        }
        match comment.parent_id {
            Some(parent) if parent.is_zero() || parent == comment.id => {
                return Err(DomainError::InvalidReference(format!(
                    "invalid parent comment {parent}"
                )));
            }
            _ => {}
        }
        self.validate_content(&comment.content)
    }

    fn validate_content(&self, content: &str) -> RepoResult<()> {
        if Comment::content_is_valid(content, self.max_content_length) {
            Ok(())
        } else {
            Err(DomainError::ValidationError(format!(
                "comment must be 1-{} characters",
                self.max_content_length
            )))
        }
    }

    async fn insert<'e, E>(&self, executor: E, comment: &Comment) -> RepoResult<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.validate_new(comment)?;
        let row = CommentInsert::new(comment);

        sqlx::query(
            r"
            INSERT INTO comments (id, post_id, parent_id, author_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(row.id)
        .bind(row.post_id)
        .bind(row.parent_id)
        .bind(row.author_id)
        .bind(row.content)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(executor)
        .await
        .map_err(|e| {
            map_write_error(e, || {
                DomainError::AlreadyExists(format!("comment {}", comment.id))
            })
        })?;

        Ok(())
    }

    async fn set_text<'e, E>(&self, executor: E, id: EntityId, content: &str) -> RepoResult<Comment>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.validate_content(content)?;

        let updated = sqlx::query_as::<_, CommentModel>(
            r"
            UPDATE comments
            SET content = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, post_id, parent_id, author_id, content, created_at, updated_at
            ",
        )
        .bind(id.into_inner())
        .bind(content)
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

        updated
            .map(Comment::from)
            .ok_or_else(|| DomainError::comment_not_found(id))
    }

    async fn remove_by_ids<'e, E>(&self, executor: E, ids: &[EntityId]) -> RepoResult<Vec<EntityId>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let deleted = sqlx::query_scalar::<_, i64>(
            r"
            DELETE FROM comments WHERE id = ANY($1) RETURNING id
            ",
        )
        .bind(EntityId::to_raw(ids))
        .fetch_all(executor)
        .await
        .map_err(map_db_error)?;

        debug!(requested = ids.len(), deleted = deleted.len(), "Deleted comments by id");
        Ok(deleted.into_iter().map(EntityId::new).collect())
    }

    async fn remove_by_author<'e, E>(
        &self,
        executor: E,
        author_id: EntityId,
        only: Option<&[EntityId]>,
    ) -> RepoResult<Vec<EntityId>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let deleted = match only {
            Some([]) => return Ok(Vec::new()),
            Some(ids) => {
                sqlx::query_scalar::<_, i64>(
                    r"
                    DELETE FROM comments WHERE author_id = $1 AND id = ANY($2) RETURNING id
                    ",
                )
                .bind(author_id.into_inner())
                .bind(EntityId::to_raw(ids))
                .fetch_all(executor)
                .await
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    r"
                    DELETE FROM comments WHERE author_id = $1 RETURNING id
                    ",
                )
                .bind(author_id.into_inner())
                .fetch_all(executor)
                .await
            }
        }
        .map_err(map_db_error)?;

        debug!(%author_id, deleted = deleted.len(), "Deleted comments by author");
        Ok(deleted.into_iter().map(EntityId::new).collect())
    }

    async fn remove_by_container<'e, E>(
        &self,
        executor: E,
        post_ids: &[EntityId],
    ) -> RepoResult<Vec<EntityId>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let deleted = sqlx::query_scalar::<_, i64>(
            r"
            DELETE FROM comments WHERE post_id = ANY($1) RETURNING id
            ",
        )
        .bind(EntityId::to_raw(post_ids))
        .fetch_all(executor)
        .await
        .map_err(map_db_error)?;

        debug!(posts = post_ids.len(), deleted = deleted.len(), "Deleted comments by post");
        Ok(deleted.into_iter().map(EntityId::new).collect())
    }

    async fn top_level_page(
        &self,
        conn: &mut PgConnection,
        post_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<Comment>> {
        let total = self.top_level.aggregate(&mut *conn, &[post_id]).await?[0].first();
        if total == 0 {
            return Ok(Page::empty(page));
        }

        let results = sqlx::query_as::<_, CommentModel>(
            r"
            SELECT id, post_id, parent_id, author_id, content, created_at, updated_at
            FROM comments
            WHERE post_id = $1 AND parent_id IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(post_id.into_inner())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await
        .map_err(map_db_error)?;

        Ok(Page::new(
            results.into_iter().map(Comment::from).collect(),
            total,
            page,
        ))
    }

    async fn subtree_page(
        &self,
        conn: &mut PgConnection,
        comment_id: EntityId,
        include_descendants: bool,
        page: PageRequest,
    ) -> RepoResult<Page<Comment>> {
        let total = self.replies.aggregate(&mut *conn, &[comment_id]).await?[0].first();
        if total == 0 {
            return Ok(Page::empty(page));
        }

        let results = if include_descendants {
            // Window the direct children, then descend from the in-window ones
            sqlx::query_as::<_, CommentModel>(
                r"
                WITH RECURSIVE direct AS (
                    SELECT id, post_id, parent_id, author_id, content, created_at, updated_at
                    FROM comments
                    WHERE parent_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2 OFFSET $3
                ),
                tree AS (
                    SELECT id, post_id, parent_id, author_id, content, created_at, updated_at
                    FROM direct
                    UNION ALL
                    SELECT c.id, c.post_id, c.parent_id, c.author_id, c.content, c.created_at, c.updated_at
                    FROM comments c
                    JOIN tree p ON c.parent_id = p.id
                )
                SELECT id, post_id, parent_id, author_id, content, created_at, updated_at
                FROM tree
                ORDER BY created_at DESC, id DESC
                ",
            )
            .bind(comment_id.into_inner())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await
        } else {
            sqlx::query_as::<_, CommentModel>(
                r"
                SELECT id, post_id, parent_id, author_id, content, created_at, updated_at
                FROM comments
                WHERE parent_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2 OFFSET $3
                ",
            )
            .bind(comment_id.into_inner())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await
        }
        .map_err(map_db_error)?;

        debug!(direct_total = total, returned = results.len(), "Fetched comment subtree");
        Ok(Page::new(
            results.into_iter().map(Comment::from).collect(),
            total,
            page,
        ))
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: EntityId) -> RepoResult<Option<Comment>> {
        let result = sqlx::query_as::<_, CommentModel>(
            r"
            SELECT id, post_id, parent_id, author_id, content, created_at, updated_at
            FROM comments
            WHERE id = $1
            ",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(Comment::from))
    }

    #[instrument(skip(self, comment), fields(comment_id = %comment.id, post_id = %comment.post_id))]
    async fn create(&self, comment: &Comment) -> RepoResult<()> {
        self.insert(&self.pool, comment).await
    }

    #[instrument(skip(self, content))]
    async fn update_text(&self, id: EntityId, content: &str) -> RepoResult<Comment> {
        self.set_text(&self.pool, id, content).await
    }

    #[instrument(skip(self))]
    async fn fetch_top_level(
        &self,
        post_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<Comment>> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        self.top_level_page(&mut conn, post_id, page).await
    }

    #[instrument(skip(self))]
    async fn fetch_subtree(
        &self,
        comment_id: EntityId,
        include_descendants: bool,
        page: PageRequest,
    ) -> RepoResult<Page<Comment>> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        self.subtree_page(&mut conn, comment_id, include_descendants, page)
            .await
    }

    #[instrument(skip(self, comment_ids), fields(count = comment_ids.len()))]
    async fn reply_counts(&self, comment_ids: &[EntityId]) -> RepoResult<Vec<i64>> {
        let counts = self.replies.aggregate(&self.pool, comment_ids).await?;
        Ok(counts.iter().map(|c| c.first()).collect())
    }

    #[instrument(skip(self, post_ids), fields(count = post_ids.len()))]
    async fn container_counts(&self, post_ids: &[EntityId]) -> RepoResult<Vec<i64>> {
        let counts = self.top_level.aggregate(&self.pool, post_ids).await?;
        Ok(counts.iter().map(|c| c.first()).collect())
    }

    #[instrument(skip(self))]
    async fn delete_by_ids(&self, ids: &[EntityId]) -> RepoResult<Vec<EntityId>> {
        self.remove_by_ids(&self.pool, ids).await
    }

    #[instrument(skip(self))]
    async fn delete_by_author(
        &self,
        author_id: EntityId,
        only: Option<&[EntityId]>,
    ) -> RepoResult<Vec<EntityId>> {
        self.remove_by_author(&self.pool, author_id, only).await
    }

    #[instrument(skip(self))]
    async fn delete_by_container(&self, post_ids: &[EntityId]) -> RepoResult<Vec<EntityId>> {
        self.remove_by_container(&self.pool, post_ids).await
    }
}
