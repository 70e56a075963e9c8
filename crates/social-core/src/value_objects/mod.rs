//! Value objects - immutable types that represent domain concepts

mod entity_id;
mod page;

pub use entity_id::{EntityId, EntityIdParseError};
pub use page::{Page, PageRequest};
