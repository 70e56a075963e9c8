//! Relation edges - reactions, follows and blocks between actors and targets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::EntityId;

/// Table (key space) a relation edge lives in
///
/// Every space is keyed on `(subject_id, target_id)`, so an actor holds at
/// most one edge per target regardless of kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationSpace {
    /// actor -> comment, like or dislike
    Reactions,
    /// actor -> actor
    Follows,
    /// actor -> actor
    Blocks,
}

impl RelationSpace {
    pub fn table(self) -> &'static str {
        match self {
            Self::Reactions => "comment_reactions",
            Self::Follows => "follows",
            Self::Blocks => "blocks",
        }
    }

    /// Kinds an edge in this space may carry
    pub fn kinds(self) -> &'static [RelationKind] {
        match self {
            Self::Reactions => &[RelationKind::Like, RelationKind::Dislike],
            Self::Follows => &[RelationKind::Follow],
            Self::Blocks => &[RelationKind::Block],
        }
    }

    #[inline]
    pub fn accepts(self, kind: RelationKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// The only kind of a single-polarity space
    pub fn default_kind(self) -> RelationKind {
        self.kinds()[0]
    }
}

/// Polarity tag stored with an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Like,
    Dislike,
    Follow,
    Block,
}

impl RelationKind {
    /// Stored SMALLINT code
    pub const fn code(self) -> i16 {
        match self {
            Self::Like => 1,
            Self::Dislike => 2,
            Self::Follow => 3,
            Self::Block => 4,
        }
    }

    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Like),
            2 => Some(Self::Dislike),
            3 => Some(Self::Follow),
            4 => Some(Self::Block),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
            Self::Follow => "follow",
            Self::Block => "block",
        }
    }
}

/// Existence of an edge after a flip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationState {
    On,
    Off,
}

impl RelationState {
    #[inline]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Which endpoint of an edge a count is grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Edges the id originates (e.g. following)
    Outgoing,
    /// Edges pointing at the id (e.g. followers)
    Incoming,
    /// Both counts in one pass: `[outgoing, incoming]`
    Both,
}

/// A directed, uniquely keyed edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub subject_id: EntityId,
    pub target_id: EntityId,
    pub kind: RelationKind,
    pub created_at: DateTime<Utc>,
}

impl RelationEdge {
    pub fn new(subject_id: EntityId, target_id: EntityId, kind: RelationKind) -> Self {
        Self {
            subject_id,
            target_id,
            kind,
            created_at: Utc::now(),
        }
    }

    pub fn like(actor_id: EntityId, comment_id: EntityId) -> Self {
        Self::new(actor_id, comment_id, RelationKind::Like)
    }

    pub fn dislike(actor_id: EntityId, comment_id: EntityId) -> Self {
        Self::new(actor_id, comment_id, RelationKind::Dislike)
    }

    pub fn follow(follower_id: EntityId, followee_id: EntityId) -> Self {
        Self::new(follower_id, followee_id, RelationKind::Follow)
    }

    pub fn block(blocker_id: EntityId, blocked_id: EntityId) -> Self {
        Self::new(blocker_id, blocked_id, RelationKind::Block)
    }

    #[inline]
    pub fn is_self_edge(&self) -> bool {
        self.subject_id == self.target_id
    }
}
