//! Repository implementations
//!
//! PostgreSQL implementations of the repository traits defined in social-core.
//! Each repository runs standalone against its pool through the trait, and
//! exposes `*_tx` variants that run on a caller-supplied connection (usually
//! an open transaction) for multi-statement units of work.

mod comment;
mod error;
mod relation;

pub use comment::PgCommentRepository;
pub use relation::PgRelationRepository;

pub(crate) use error::map_db_error;
