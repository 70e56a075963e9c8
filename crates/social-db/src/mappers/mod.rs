//! Entity to model mappers
//!
//! This module provides conversions between domain entities (social-core) and database models.
//! - `From<Model> for Entity` / `TryFrom`: Convert database rows to domain objects
//! - `*Insert` structs: Prepare entity data for database operations

mod comment;
mod relation;

pub use comment::CommentInsert;
pub use relation::RelationInsert;

pub(crate) use relation::kind_from_code;
