//! Error handling utilities for repositories

use social_core::error::DomainError;
use sqlx::Error as SqlxError;

/// Convert SQLx error to DomainError
///
/// Connectivity failures become `StoreUnavailable`; everything else is a
/// plain database fault.
pub fn map_db_error(e: SqlxError) -> DomainError {
    match e {
        SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::WorkerCrashed
        | SqlxError::Io(_)
        | SqlxError::Tls(_) => DomainError::StoreUnavailable(e.to_string()),
        _ => DomainError::DatabaseError(e.to_string()),
    }
}

/// Map a failed INSERT/UPDATE, translating constraint violations
///
/// Unique violations go through `on_unique`; foreign keys become
/// `InvalidReference`; CHECK constraints become `ValidationError`.
pub fn map_write_error<F>(e: SqlxError, on_unique: F) -> DomainError
where
    F: FnOnce() -> DomainError,
{
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return on_unique();
        }
        if db_err.is_foreign_key_violation() {
            return DomainError::InvalidReference(describe_reference(db_err.constraint()));
        }
        if db_err.is_check_violation() {
            return DomainError::ValidationError(format!(
                "constraint {} rejected the row",
                db_err.constraint().unwrap_or("unknown")
            ));
        }
    }
    map_db_error(e)
}

/// Human-readable description of a violated foreign key
fn describe_reference(constraint: Option<&str>) -> String {
    match constraint {
        Some(name) if name.ends_with("_parent_fk") => {
            "parent comment does not exist on this post".to_string()
        }
        Some(name) if name.ends_with("_post_fk") => "post does not exist".to_string(),
        Some(name) if name.ends_with("_author_fk") => "author does not exist".to_string(),
        Some(name) if name.ends_with("_subject_fk") => "subject does not exist".to_string(),
        Some(name) if name.ends_with("_target_fk") => "target does not exist".to_string(),
        Some(name) => format!("referenced row missing ({name})"),
        None => "referenced row missing".to_string(),
    }
}
