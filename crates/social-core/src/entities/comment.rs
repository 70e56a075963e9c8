//! Comment entity - a node in a post's reply tree

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::EntityId;

/// Comment entity
///
/// `parent_id == None` marks a top-level comment on the post. A parent, when
/// set, always lives under the same `post_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    pub parent_id: Option<EntityId>,
    pub author_id: EntityId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    /// Create a new top-level comment
    pub fn new(id: EntityId, post_id: EntityId, author_id: EntityId, content: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            post_id,
            parent_id: None,
            author_id,
            content,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a reply to `parent_id`
    pub fn new_reply(
        id: EntityId,
        post_id: EntityId,
        parent_id: EntityId,
        author_id: EntityId,
        content: String,
    ) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::new(id, post_id, author_id, content)
        }
    }

    #[inline]
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    #[inline]
    pub fn is_edited(&self) -> bool {
        self.updated_at > self.created_at
    }

    /// Check that content is non-blank and within `max_len` characters
    pub fn content_is_valid(content: &str, max_len: usize) -> bool {
        !content.trim().is_empty() && content.chars().count() <= max_len
    }
}
