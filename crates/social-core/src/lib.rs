//! # social-core
//!
//! Domain layer for the social-graph engines: threaded comments, toggleable
//! relation edges and ordered per-subject aggregates.
//! This crate has zero dependencies on infrastructure (database, web framework, etc.).

pub mod entities;
pub mod error;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    AggregateCount, Comment, Direction, RelationEdge, RelationKind, RelationSpace, RelationState,
};
pub use error::DomainError;
pub use traits::{CommentRepository, RelationRepository, RepoResult};
pub use value_objects::{EntityId, EntityIdParseError, Page, PageRequest};
