//! Database models - SQLx-compatible structs for PostgreSQL tables

mod comment;
mod relation;

pub use comment::CommentModel;
pub use relation::RelationModel;
