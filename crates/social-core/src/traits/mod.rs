//! Repository traits

mod repositories;

pub use repositories::{CommentRepository, RelationRepository, RepoResult};
