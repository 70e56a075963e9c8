//! RelationEdge entity <-> model mapper

use social_core::entities::{RelationEdge, RelationKind};
use social_core::error::DomainError;
use social_core::value_objects::EntityId;

use crate::models::RelationModel;

/// Convert RelationModel to RelationEdge entity
///
/// Fails on a kind code this build does not know about.
impl TryFrom<RelationModel> for RelationEdge {
    type Error = DomainError;

    fn try_from(model: RelationModel) -> Result<Self, Self::Error> {
        let kind = kind_from_code(model.kind)?;
        Ok(RelationEdge {
            subject_id: EntityId::new(model.subject_id),
            target_id: EntityId::new(model.target_id),
            kind,
            created_at: model.created_at,
        })
    }
}

pub(crate) fn kind_from_code(code: i16) -> Result<RelationKind, DomainError> {
    RelationKind::from_code(code)
        .ok_or_else(|| DomainError::DatabaseError(format!("unknown relation kind code {code}")))
}

/// Convert RelationEdge entity reference to values for database insertion
pub struct RelationInsert {
    pub subject_id: i64,
    pub target_id: i64,
    pub kind: i16,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl RelationInsert {
    pub fn new(edge: &RelationEdge) -> Self {
        Self {
            subject_id: edge.subject_id.into_inner(),
            target_id: edge.target_id.into_inner(),
            kind: edge.kind.code(),
            created_at: edge.created_at,
        }
    }
}
