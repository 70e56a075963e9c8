//! Offset pagination

use serde::{Deserialize, Serialize};

/// Offset/limit window over an ordered listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: i64,
    pub limit: i64,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// Limit clamped to `1..=MAX_LIMIT`
    #[inline]
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }

    /// Offset with negatives treated as zero
    #[inline]
    pub fn offset(&self) -> i64 {
        self.offset.max(0)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One window of results plus the size of the full listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    #[serde(skip)]
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            request,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), 0, request)
    }

    /// Whether rows exist past this window
    pub fn has_more(&self) -> bool {
        self.request.offset() + self.request.limit() < self.total
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            request: self.request,
        }
    }
}
