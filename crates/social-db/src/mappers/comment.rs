//! Comment entity <-> model mapper

use chrono::{DateTime, Utc};
use social_core::entities::Comment;
use social_core::value_objects::EntityId;

use crate::models::CommentModel;

/// Convert CommentModel to Comment entity
impl From<CommentModel> for Comment {
    fn from(model: CommentModel) -> Self {
        Comment {
            id: EntityId::new(model.id),
            post_id: EntityId::new(model.post_id),
            parent_id: model.parent_id.map(EntityId::new),
            author_id: EntityId::new(model.author_id),
            content: model.content,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Convert Comment entity reference to values for database insertion
pub struct CommentInsert<'a> {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub content: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> CommentInsert<'a> {
    pub fn new(comment: &'a Comment) -> Self {
        Self {
            id: comment.id.into_inner(),
            post_id: comment.post_id.into_inner(),
            parent_id: comment.parent_id.map(EntityId::into_inner),
            author_id: comment.author_id.into_inner(),
            content: &comment.content,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}
