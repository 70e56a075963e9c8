//! PostgreSQL implementation of RelationRepository

use async_trait::async_trait;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use tracing::{debug, instrument};

use social_core::entities::{
    AggregateCount, Direction, RelationEdge, RelationKind, RelationSpace, RelationState,
};
use social_core::error::DomainError;
use social_core::traits::{RelationRepository, RepoResult};
use social_core::value_objects::{EntityId, Page, PageRequest};

use crate::aggregate::{Condition, CountRule, OrderedBatchAggregator, Value};
use crate::mappers::{kind_from_code, RelationInsert};
use crate::models::RelationModel;

use super::error::{map_db_error, map_write_error};

/// SQL rendered once per relation table
#[derive(Debug, Clone)]
struct Statements {
    insert: String,
    delete: String,
    replace: String,
    find_kind: String,
    exists: String,
    exists_either: String,
    list_outgoing: String,
    list_incoming: String,
    delete_outgoing: String,
    delete_touching: String,
    lock_key: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            insert: format!(
                "INSERT INTO {table} (subject_id, target_id, kind, created_at) VALUES ($1, $2, $3, $4)"
            ),
            delete: format!(
                "DELETE FROM {table} WHERE subject_id = $1 AND target_id = $2 AND kind = $3"
            ),
            // Reading the CTE forces the delete to run before the insert
            replace: format!(
                "WITH removed AS (DELETE FROM {table} WHERE subject_id = $1 AND target_id = $2 RETURNING kind) \
                 INSERT INTO {table} (subject_id, target_id, kind, created_at) \
                 SELECT $1::BIGINT, $2::BIGINT, $3::SMALLINT, $4::TIMESTAMPTZ FROM (SELECT COUNT(*) FROM removed) AS gone"
            ),
            find_kind: format!(
                "SELECT kind FROM {table} WHERE subject_id = $1 AND target_id = $2"
            ),
            exists: format!(
                "SELECT EXISTS(SELECT 1 FROM {table} WHERE subject_id = $1 AND target_id = $2)"
            ),
            exists_either: format!(
                "SELECT EXISTS(SELECT 1 FROM {table} \
                 WHERE (subject_id = $1 AND target_id = $2) OR (subject_id = $2 AND target_id = $1))"
            ),
            list_outgoing: format!(
                "SELECT subject_id, target_id, kind, created_at FROM {table} \
                 WHERE subject_id = $1 ORDER BY created_at DESC, target_id DESC LIMIT $2 OFFSET $3"
            ),
            list_incoming: format!(
                "SELECT subject_id, target_id, kind, created_at FROM {table} \
                 WHERE target_id = $1 ORDER BY created_at DESC, subject_id DESC LIMIT $2 OFFSET $3"
            ),
            delete_outgoing: format!("DELETE FROM {table} WHERE subject_id = $1"),
            delete_touching: format!(
                "DELETE FROM {table} WHERE subject_id = $1 OR target_id = $1"
            ),
            lock_key: format!("{table}:"),
        }
    }
}

/// PostgreSQL implementation of RelationRepository
///
/// One instance serves one [`RelationSpace`]; the space picks the table and
/// the kinds an edge may carry. Every table is keyed on
/// `(subject_id, target_id)`, so a changed polarity replaces the stored edge.
#[derive(Clone)]
pub struct PgRelationRepository {
    pool: PgPool,
    space: RelationSpace,
    sql: Statements,
    outgoing: OrderedBatchAggregator,
    incoming: OrderedBatchAggregator,
    both: OrderedBatchAggregator,
}

impl PgRelationRepository {
    /// Create a new PgRelationRepository for one relation space
    pub fn new(pool: PgPool, space: RelationSpace) -> Self {
        let table = space.table();
        Self {
            pool,
            space,
            sql: Statements::for_table(table),
            outgoing: OrderedBatchAggregator::over(table, "subject_id")
                .rule(CountRule::all("outgoing")),
            incoming: OrderedBatchAggregator::over(table, "target_id")
                .rule(CountRule::all("incoming")),
            both: OrderedBatchAggregator::over(table, "subject_id")
                .join_on(vec![Condition::AnyOf(vec![
                    Condition::MatchesSubject("subject_id"),
                    Condition::MatchesSubject("target_id"),
                ])])
                .rule(CountRule::matching(
                    "outgoing",
                    vec![Condition::MatchesSubject("subject_id")],
                ))
                .rule(CountRule::matching(
                    "incoming",
                    vec![Condition::MatchesSubject("target_id")],
                )),
        }
    }

    /// Insert an edge on a caller-supplied connection
    #[instrument(skip(self, conn, edge), fields(space = ?self.space, subject = %edge.subject_id, target = %edge.target_id))]
    pub async fn create_tx(&self, conn: &mut PgConnection, edge: &RelationEdge) -> RepoResult<()> {
        self.validate(edge)?;
        self.insert(&mut *conn, edge).await
    }

    /// Remove an edge on a caller-supplied connection
    #[instrument(skip(self, conn, edge), fields(space = ?self.space, subject = %edge.subject_id, target = %edge.target_id))]
    pub async fn delete_tx(&self, conn: &mut PgConnection, edge: &RelationEdge) -> RepoResult<()> {
        self.validate(edge)?;
        self.remove(&mut *conn, edge).await
    }

    /// Flip an edge inside the caller's transaction
    ///
    /// Takes a transaction-scoped advisory lock on the edge key first, so
    /// concurrent flips of the same key serialize until the caller commits.
    /// Outside an explicit transaction the lock is released as soon as the
    /// statement finishes and gives no protection.
    ///
    /// The transaction must run at READ COMMITTED. Under REPEATABLE READ or
    /// SERIALIZABLE the snapshot predates the lock wait, so a flip queued
    /// behind another would read a stale key; such transactions are
    /// rejected with `ValidationError` before the lock is taken.
    #[instrument(skip(self, conn, edge), fields(space = ?self.space, subject = %edge.subject_id, target = %edge.target_id))]
    pub async fn flip_tx(
        &self,
        conn: &mut PgConnection,
        edge: &RelationEdge,
    ) -> RepoResult<RelationState> {
        self.validate(edge)?;

        let isolation =
            sqlx::query_scalar::<_, String>("SELECT current_setting('transaction_isolation')")
                .fetch_one(&mut *conn)
                .await
                .map_err(map_db_error)?;
        if isolation != "read committed" {
            return Err(DomainError::ValidationError(format!(
                "flip_tx requires read committed isolation, transaction runs at {isolation}"
            )));
        }

        let key = format!("{}{}:{}", self.sql.lock_key, edge.subject_id, edge.target_id);
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(map_db_error)?;

        self.toggle(conn, edge).await
    }

    /// Page a subject's outgoing edges on a caller-supplied connection
    ///
    /// Total and items come from two statements; run this inside a
    /// REPEATABLE READ transaction for a page consistent with its total.
    #[instrument(skip(self, conn), fields(space = ?self.space))]
    pub async fn list_outgoing_tx(
        &self,
        conn: &mut PgConnection,
        subject_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<RelationEdge>> {
        self.list(conn, Direction::Outgoing, subject_id, page).await
    }

    /// Page a target's incoming edges on a caller-supplied connection
    #[instrument(skip(self, conn), fields(space = ?self.space))]
    pub async fn list_incoming_tx(
        &self,
        conn: &mut PgConnection,
        target_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<RelationEdge>> {
        self.list(conn, Direction::Incoming, target_id, page).await
    }

    /// Remove a subject's edges on a caller-supplied connection
    #[instrument(skip(self, conn), fields(space = ?self.space))]
    pub async fn delete_all_for_subject_tx(
        &self,
        conn: &mut PgConnection,
        subject_id: EntityId,
        include_incoming: bool,
    ) -> RepoResult<u64> {
        self.remove_all(&mut *conn, subject_id, include_incoming).await
    }

    fn validate(&self, edge: &RelationEdge) -> RepoResult<()> {
        if edge.subject_id.is_zero() || edge.target_id.is_zero() {
            return Err(DomainError::InvalidReference(
                "relation endpoints must be set".to_string(),
            ));
        }
        if !self.space.accepts(edge.kind) {
            return Err(DomainError::ValidationError(format!(
                "{} is not a valid kind for {}",
                edge.kind.as_str(),
                self.space.table()
            )));
        }
        if self.space != RelationSpace::Reactions && edge.is_self_edge() {
            return Err(DomainError::ValidationError(format!(
                "actor {} cannot {} itself",
                edge.subject_id,
                edge.kind.as_str()
            )));
        }
        Ok(())
    }

    /// Check-then-act on one connection; atomic only under the caller's lock
    async fn toggle(&self, conn: &mut PgConnection, edge: &RelationEdge) -> RepoResult<RelationState> {
        let current = self
            .current_kind(&mut *conn, edge.subject_id, edge.target_id)
            .await?;

        match current {
            Some(kind) if kind == edge.kind => {
                self.remove(&mut *conn, edge).await?;
                debug!(kind = kind.as_str(), "Relation flipped off");
                Ok(RelationState::Off)
            }
            Some(previous) => {
                self.write(&mut *conn, &self.sql.replace, edge).await?;
                debug!(
                    from = previous.as_str(),
                    to = edge.kind.as_str(),
                    "Relation polarity replaced"
                );
                Ok(RelationState::On)
            }
            None => {
                self.write(&mut *conn, &self.sql.insert, edge).await?;
                debug!(kind = edge.kind.as_str(), "Relation flipped on");
                Ok(RelationState::On)
            }
        }
    }

    async fn insert<'e, E>(&self, executor: E, edge: &RelationEdge) -> RepoResult<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.write(executor, &self.sql.insert, edge).await
    }

    /// Run `insert` or `replace`; both bind the edge as `$1..$4`
    async fn write<'e, E>(&self, executor: E, sql: &str, edge: &RelationEdge) -> RepoResult<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = RelationInsert::new(edge);

        sqlx::query(sql)
            .bind(row.subject_id)
            .bind(row.target_id)
            .bind(row.kind)
            .bind(row.created_at)
            .execute(executor)
            .await
            .map_err(|e| {
                map_write_error(e, || {
                    DomainError::AlreadyExists(format!(
                        "{} {} -> {}",
                        self.space.table(),
                        edge.subject_id,
                        edge.target_id
                    ))
                })
            })?;

        Ok(())
    }

    async fn remove<'e, E>(&self, executor: E, edge: &RelationEdge) -> RepoResult<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(&self.sql.delete)
            .bind(edge.subject_id.into_inner())
            .bind(edge.target_id.into_inner())
            .bind(edge.kind.code())
            .execute(executor)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::relation_not_found(edge));
        }
        Ok(())
    }

    async fn current_kind<'e, E>(
        &self,
        executor: E,
        subject_id: EntityId,
        target_id: EntityId,
    ) -> RepoResult<Option<RelationKind>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let code = sqlx::query_scalar::<_, i16>(&self.sql.find_kind)
            .bind(subject_id.into_inner())
            .bind(target_id.into_inner())
            .fetch_optional(executor)
            .await
            .map_err(map_db_error)?;

        code.map(kind_from_code).transpose()
    }

    async fn remove_all<'e, E>(
        &self,
        executor: E,
        subject_id: EntityId,
        include_incoming: bool,
    ) -> RepoResult<u64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // Reaction targets are comments, not actors
        if include_incoming && self.space == RelationSpace::Reactions {
            return Err(DomainError::ValidationError(
                "reactions have no incoming edges for an actor".to_string(),
            ));
        }

        let sql = if include_incoming {
            &self.sql.delete_touching
        } else {
            &self.sql.delete_outgoing
        };

        let result = sqlx::query(sql)
            .bind(subject_id.into_inner())
            .execute(executor)
            .await
            .map_err(map_db_error)?;

        debug!(%subject_id, deleted = result.rows_affected(), "Deleted relation edges");
        Ok(result.rows_affected())
    }

    async fn list(
        &self,
        conn: &mut PgConnection,
        direction: Direction,
        anchor: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<RelationEdge>> {
        let (aggregator, sql) = match direction {
            Direction::Incoming => (&self.incoming, &self.sql.list_incoming),
            _ => (&self.outgoing, &self.sql.list_outgoing),
        };

        let total = aggregator.aggregate(&mut *conn, &[anchor]).await?[0].first();
        if total == 0 {
            return Ok(Page::empty(page));
        }

        let rows = sqlx::query_as::<_, RelationModel>(sql)
            .bind(anchor.into_inner())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&mut *conn)
            .await
            .map_err(map_db_error)?;

        let items = rows
            .into_iter()
            .map(RelationEdge::try_from)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(Page::new(items, total, page))
    }
}

#[async_trait]
impl RelationRepository for PgRelationRepository {
    #[instrument(skip(self, edge), fields(subject = %edge.subject_id, target = %edge.target_id))]
    async fn create(&self, edge: &RelationEdge) -> RepoResult<()> {
        self.validate(edge)?;
        self.insert(&self.pool, edge).await
    }

    #[instrument(skip(self, edge), fields(subject = %edge.subject_id, target = %edge.target_id))]
    async fn delete(&self, edge: &RelationEdge) -> RepoResult<()> {
        self.validate(edge)?;
        self.remove(&self.pool, edge).await
    }

    /// Runs standalone on one pooled connection without a lock; two
    /// concurrent flips of an absent key can both try to insert, and the
    /// loser fails with `AlreadyExists`. Use `flip_tx` to serialize.
    #[instrument(skip(self, edge), fields(subject = %edge.subject_id, target = %edge.target_id))]
    async fn flip(&self, edge: &RelationEdge) -> RepoResult<RelationState> {
        self.validate(edge)?;
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        self.toggle(&mut conn, edge).await
    }

    #[instrument(skip(self))]
    async fn exists(&self, subject_id: EntityId, target_id: EntityId) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(&self.sql.exists)
            .bind(subject_id.into_inner())
            .bind(target_id.into_inner())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn exists_either(&self, a: EntityId, b: EntityId) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(&self.sql.exists_either)
            .bind(a.into_inner())
            .bind(b.into_inner())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn find_kind(
        &self,
        subject_id: EntityId,
        target_id: EntityId,
    ) -> RepoResult<Option<RelationKind>> {
        self.current_kind(&self.pool, subject_id, target_id).await
    }

    #[instrument(skip(self, target_ids), fields(targets = target_ids.len()))]
    async fn batch_exists(
        &self,
        subject_id: EntityId,
        target_ids: &[EntityId],
    ) -> RepoResult<Vec<bool>> {
        let aggregator = OrderedBatchAggregator::over(self.space.table(), "target_id")
            .also_join(Condition::Equals(
                "subject_id",
                Value::BigInt(subject_id.into_inner()),
            ))
            .rule(CountRule::all("present"));

        let counts = aggregator.aggregate(&self.pool, target_ids).await?;
        Ok(counts.iter().map(|c| c.first() > 0).collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn counts_for(
        &self,
        ids: &[EntityId],
        direction: Direction,
    ) -> RepoResult<Vec<AggregateCount>> {
        let aggregator = match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
            Direction::Both => &self.both,
        };
        aggregator.aggregate(&self.pool, ids).await
    }

    #[instrument(skip(self, target_ids), fields(count = target_ids.len()))]
    async fn kind_counts(
        &self,
        target_ids: &[EntityId],
        kinds: &[RelationKind],
    ) -> RepoResult<Vec<AggregateCount>> {
        if let Some(kind) = kinds.iter().find(|k| !self.space.accepts(**k)) {
            return Err(DomainError::ValidationError(format!(
                "{} is not a valid kind for {}",
                kind.as_str(),
                self.space.table()
            )));
        }

        let aggregator = kinds.iter().fold(
            OrderedBatchAggregator::over(self.space.table(), "target_id"),
            |agg, kind| {
                agg.rule(CountRule::matching(
                    kind.as_str(),
                    vec![Condition::Equals("kind", Value::SmallInt(kind.code()))],
                ))
            },
        );

        aggregator.aggregate(&self.pool, target_ids).await
    }

    #[instrument(skip(self))]
    async fn list_outgoing(
        &self,
        subject_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<RelationEdge>> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        self.list(&mut conn, Direction::Outgoing, subject_id, page)
            .await
    }

    #[instrument(skip(self))]
    async fn list_incoming(
        &self,
        target_id: EntityId,
        page: PageRequest,
    ) -> RepoResult<Page<RelationEdge>> {
        let mut conn = self.pool.acquire().await.map_err(map_db_error)?;
        self.list(&mut conn, Direction::Incoming, target_id, page)
            .await
    }

    #[instrument(skip(self))]
    async fn delete_all_for_subject(
        &self,
        subject_id: EntityId,
        include_incoming: bool,
    ) -> RepoResult<u64> {
        self.remove_all(&self.pool, subject_id, include_incoming).await
    }
}
