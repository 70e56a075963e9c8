//! Ordered batch aggregation
//!
//! Computes per-subject counts for an ordered, possibly duplicated list of
//! ids in one round trip. The id list is unnested `WITH ORDINALITY` so every
//! input position keeps its own row, left-joined to the counted table,
//! counted per rule with `COUNT(..) FILTER (WHERE ..)`, then grouped and
//! ordered by ordinal:
//!
//! ```sql
//! SELECT s.ord, s.subject_id,
//!        COUNT(t.parent_id) AS "replies"
//! FROM UNNEST($1::BIGINT[]) WITH ORDINALITY AS s(subject_id, ord)
//! LEFT JOIN comments t ON t.parent_id = s.subject_id
//! GROUP BY s.ord, s.subject_id
//! ORDER BY s.ord
//! ```
//!
//! Ids with no matching rows come back as zeros instead of disappearing.

use sqlx::postgres::PgRow;
use sqlx::{Executor, Postgres, QueryBuilder, Row};
use tracing::{instrument, warn};

use social_core::entities::AggregateCount;
use social_core::error::DomainError;
use social_core::traits::RepoResult;
use social_core::value_objects::EntityId;

use crate::repositories::map_db_error;

/// Bound comparison value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    BigInt(i64),
    SmallInt(i16),
}

/// Predicate over a row `t` of the counted table
///
/// Column names are compile-time identifiers; values are always bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `t.<column> = s.subject_id`
    MatchesSubject(&'static str),
    /// `t.<column> = $n`
    Equals(&'static str, Value),
    /// `t.<column> IS NULL`
    IsNull(&'static str),
    /// Disjunction of the inner conditions
    AnyOf(Vec<Condition>),
}

/// A named count column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRule {
    pub name: &'static str,
    /// Conjunction; empty counts every joined row
    pub filter: Vec<Condition>,
}

impl CountRule {
    pub fn all(name: &'static str) -> Self {
        Self {
            name,
            filter: Vec::new(),
        }
    }

    pub fn matching(name: &'static str, filter: Vec<Condition>) -> Self {
        Self { name, filter }
    }
}

/// Ordered, zero-filling, duplicate-preserving count query over one table
#[derive(Debug, Clone)]
pub struct OrderedBatchAggregator {
    table: &'static str,
    /// Counted column; NOT NULL on every joined row
    key: &'static str,
    join: Vec<Condition>,
    rules: Vec<CountRule>,
}

impl OrderedBatchAggregator {
    /// Aggregate `table` grouped on `key = subject`
    pub fn over(table: &'static str, key: &'static str) -> Self {
        Self {
            table,
            key,
            join: vec![Condition::MatchesSubject(key)],
            rules: Vec::new(),
        }
    }

    /// Add a conjunct to the join condition
    pub fn also_join(mut self, condition: Condition) -> Self {
        self.join.push(condition);
        self
    }

    /// Replace the join condition entirely
    pub fn join_on(mut self, conditions: Vec<Condition>) -> Self {
        self.join = conditions;
        self
    }

    pub fn rule(mut self, rule: CountRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Run the aggregate for `subject_ids`, one result per input position
    #[instrument(skip(self, executor, subject_ids), fields(table = self.table, rules = self.rules.len(), subjects = subject_ids.len()))]
    pub async fn aggregate<'e, E>(
        &self,
        executor: E,
        subject_ids: &[EntityId],
    ) -> RepoResult<Vec<AggregateCount>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        if subject_ids.is_empty() {
            return Ok(Vec::new());
        }
        if self.rules.is_empty() {
            return Err(DomainError::ValidationError(
                "aggregate needs at least one counting rule".to_string(),
            ));
        }

        let mut query = self.build_query(EntityId::to_raw(subject_ids));
        let rows = query
            .build()
            .fetch_all(executor)
            .await
            .map_err(map_db_error)?;

        let decoded = rows
            .iter()
            .map(|row| self.decode_row(row))
            .collect::<RepoResult<Vec<_>>>()?;

        align(subject_ids, decoded, self.rules.len())
    }

    fn build_query(&self, subject_ids: Vec<i64>) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT s.ord, s.subject_id");

        for rule in &self.rules {
            qb.push(format_args!(", COUNT(t.{})", self.key));
            if !rule.filter.is_empty() {
                qb.push(" FILTER (WHERE ");
                push_conjunction(&mut qb, &rule.filter);
                qb.push(")");
            }
            qb.push(format_args!(" AS \"{}\"", rule.name));
        }

        qb.push(" FROM UNNEST(");
        qb.push_bind(subject_ids);
        qb.push("::BIGINT[]) WITH ORDINALITY AS s(subject_id, ord)");
        qb.push(format_args!(" LEFT JOIN {} t ON ", self.table));
        push_conjunction(&mut qb, &self.join);
        qb.push(" GROUP BY s.ord, s.subject_id ORDER BY s.ord");

        qb
    }

    fn decode_row(&self, row: &PgRow) -> RepoResult<(i64, i64, Vec<i64>)> {
        let ord: i64 = row.try_get(0).map_err(map_db_error)?;
        let subject: i64 = row.try_get(1).map_err(map_db_error)?;
        let counts = (0..self.rules.len())
            .map(|i| row.try_get::<i64, _>(i + 2).map_err(map_db_error))
            .collect::<RepoResult<Vec<_>>>()?;
        Ok((ord, subject, counts))
    }
}

fn push_conjunction(qb: &mut QueryBuilder<'static, Postgres>, conditions: &[Condition]) {
    if conditions.is_empty() {
        qb.push("TRUE");
        return;
    }
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        push_condition(qb, condition);
    }
}

fn push_condition(qb: &mut QueryBuilder<'static, Postgres>, condition: &Condition) {
    match condition {
        Condition::MatchesSubject(column) => {
            qb.push(format_args!("t.{column} = s.subject_id"));
        }
        Condition::Equals(column, value) => {
            qb.push(format_args!("t.{column} = "));
            match *value {
                Value::BigInt(v) => qb.push_bind(v),
                Value::SmallInt(v) => qb.push_bind(v),
            };
        }
        Condition::IsNull(column) => {
            qb.push(format_args!("t.{column} IS NULL"));
        }
        Condition::AnyOf(inner) => {
            if inner.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push("(");
            for (i, c) in inner.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_condition(qb, c);
            }
            qb.push(")");
        }
    }
}

/// Pair decoded rows with the requested subjects, position by position
///
/// Any row-count or ordinal disagreement is an internal fault and is never
/// padded or truncated away.
fn align(
    subject_ids: &[EntityId],
    rows: Vec<(i64, i64, Vec<i64>)>,
    rules: usize,
) -> RepoResult<Vec<AggregateCount>> {
    let mismatch = |actual: usize| DomainError::ResultCardinalityMismatch {
        expected: subject_ids.len(),
        actual,
    };

    if rows.len() != subject_ids.len() {
        warn!(expected = subject_ids.len(), actual = rows.len(), "Aggregate row count mismatch");
        return Err(mismatch(rows.len()));
    }

    let actual = rows.len();
    subject_ids
        .iter()
        .zip(rows)
        .enumerate()
        .map(|(position, (subject, (ord, row_subject, counts)))| {
            let in_step = ord == position as i64 + 1 && row_subject == subject.into_inner();
            if !in_step || counts.len() != rules {
                warn!(position, ord, subject = %subject, row_subject, "Aggregate row out of sequence");
                return Err(mismatch(actual));
            }
            Ok(AggregateCount::new(*subject, counts))
        })
        .collect()
}
