use crate::categories::Category;
use chrono::NaiveDate;
use serde::Serialize;

/// Filter criteria for querying content records
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub category: Option<Category>,
    pub on_or_after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    /// Create a new empty filter
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Only records on or after this day
    pub fn on_or_after(mut self, day: NaiveDate) -> Self {
        self.on_or_after = Some(day);
        self
    }

    /// Only records strictly before this day
    pub fn before(mut self, day: NaiveDate) -> Self {
        self.before = Some(day);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, category: Category, day: NaiveDate) -> bool {
        if let Some(wanted) = self.category {
            if wanted != category {
                return false;
            }
        }
        if let Some(start) = self.on_or_after {
            if day < start {
                return false;
            }
        }
        if let Some(end) = self.before {
            if day >= end {
                return false;
            }
        }
        true
    }
}

/// Aggregate counts for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    /// Number of stored records.
    pub total_days: u64,
    /// Number of distinct calendar days with a record.
    pub unique_days: u64,
}

/// Storage statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    pub record_count: u64,
    pub seen_count: u64,
    pub db_size_bytes: u64,
}
