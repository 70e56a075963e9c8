//! Per-subject counts produced by ordered batch aggregation

use serde::Serialize;

use crate::value_objects::EntityId;

/// Counts for one requested subject, one value per counting rule
///
/// Never persisted. A subject that matched nothing carries all zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateCount {
    pub subject_id: EntityId,
    pub counts: Vec<i64>,
}

impl AggregateCount {
    pub fn new(subject_id: EntityId, counts: Vec<i64>) -> Self {
        Self { subject_id, counts }
    }

    /// Count for the rule at `index` (0 if out of range)
    #[inline]
    pub fn count(&self, index: usize) -> i64 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// First rule's count, for single-rule aggregates
    #[inline]
    pub fn first(&self) -> i64 {
        self.count(0)
    }

    pub fn is_zero(&self) -> bool {
        self.counts.iter().all(|c| *c == 0)
    }
}
