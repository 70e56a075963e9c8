//! Domain errors - error types for the domain layer

use thiserror::Error;

use crate::entities::RelationEdge;
use crate::value_objects::EntityId;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Lookup / constraint errors
    // =========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    // =========================================================================
    // Internal faults
    // =========================================================================
    #[error("Aggregate returned {actual} rows for {expected} subjects")]
    ResultCardinalityMismatch { expected: usize, actual: usize },

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl DomainError {
    pub fn comment_not_found(id: EntityId) -> Self {
        Self::NotFound(format!("comment {id}"))
    }

    pub fn relation_not_found(edge: &RelationEdge) -> Self {
        Self::NotFound(format!(
            "{} {} -> {}",
            edge.kind.as_str(),
            edge.subject_id,
            edge.target_id
        ))
    }

    /// Get an error code string for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::InvalidReference(_) => "INVALID_REFERENCE",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ResultCardinalityMismatch { .. } => "RESULT_CARDINALITY_MISMATCH",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Check if the caller supplied bad input
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_) | Self::InvalidReference(_))
    }

    /// Faults that are never caused by the caller
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::ResultCardinalityMismatch { .. } | Self::DatabaseError(_)
        )
    }

    /// Connectivity failures the caller's transport may choose to retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            DomainError::comment_not_found(EntityId::new(1)).code(),
            "NOT_FOUND"
        );
        assert_eq!(
            DomainError::ResultCardinalityMismatch {
                expected: 3,
                actual: 2
            }
            .code(),
            "RESULT_CARDINALITY_MISMATCH"
        );
    }

    #[test]
    fn test_classifiers() {
        assert!(DomainError::comment_not_found(EntityId::new(1)).is_not_found());
        assert!(DomainError::AlreadyExists("edge".into()).is_conflict());
        assert!(DomainError::InvalidReference("parent_id".into()).is_validation());
        assert!(DomainError::ResultCardinalityMismatch {
            expected: 1,
            actual: 0
        }
        .is_internal());
        assert!(DomainError::StoreUnavailable("pool timed out".into()).is_transient());
        assert!(!DomainError::DatabaseError("syntax".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = DomainError::comment_not_found(EntityId::new(123));
        assert_eq!(err.to_string(), "Not found: comment 123");

        let edge = RelationEdge::follow(EntityId::new(1), EntityId::new(2));
        let err = DomainError::relation_not_found(&edge);
        assert_eq!(err.to_string(), "Not found: follow 1 -> 2");

        let err = DomainError::ResultCardinalityMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Aggregate returned 3 rows for 4 subjects");
    }
}
