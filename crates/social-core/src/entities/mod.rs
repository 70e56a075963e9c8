//! Domain entities - core business objects

mod aggregate;
mod comment;
mod relation;

pub use aggregate::AggregateCount;
pub use comment::Comment;
pub use relation::{Direction, RelationEdge, RelationKind, RelationSpace, RelationState};
