//! Entity identifier - 64-bit id shared by actors, posts and comments

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Identifier of any row the engines touch (actor, post, comment).
///
/// Zero is reserved as "unset" and never names a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(i64);

impl EntityId {
    /// Create an id from a raw i64 value
    #[inline]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[inline]
    pub const fn into_inner(self) -> i64 {
        self.0
    }

    /// Check if the id is zero (uninitialized)
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Result<Self, EntityIdParseError> {
        s.trim()
            .parse::<i64>()
            .map(EntityId)
            .map_err(|_| EntityIdParseError::InvalidFormat)
    }

    /// Raw values for binding as a `BIGINT[]` parameter
    pub fn to_raw(ids: &[EntityId]) -> Vec<i64> {
        ids.iter().map(|id| id.0).collect()
    }
}

/// Error when parsing an EntityId from string
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EntityIdParseError {
    #[error("invalid entity id format")]
    InvalidFormat,
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<EntityId> for i64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl std::str::FromStr for EntityId {
    type Err = EntityIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityId::parse(s)
    }
}

// Serialize as string for JSON (JavaScript BigInt safety)
impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

// Accepts "123" as well as 123
impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<'a> {
            Number(i64),
            Text(&'a str),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(EntityId(n)),
            Raw::Text(s) => EntityId::parse(s).map_err(serde::de::Error::custom),
        }
    }
}
