//! Relation edge database model (comment_reactions, follows, blocks)

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database model for any relation table
#[derive(Debug, Clone, FromRow)]
pub struct RelationModel {
    pub subject_id: i64,
    pub target_id: i64,
    pub kind: i16,
    pub created_at: DateTime<Utc>,
}
