use crate::categories::Category;
use crate::error::Result;
use crate::storage::filters::{CategoryStats, RecordFilter, StorageStats};
use crate::types::{ContentRecord, SeenContent};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// What a daily replace did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Same-day records removed before the insert.
    pub replaced: u64,
    /// Whether the body was new to the seen ledger.
    pub newly_seen: bool,
}

/// Transactional store for daily records and the seen ledger
pub trait Storage: Send + Sync {
    // === Daily records ===

    /// The record for `category` on `day`, if one exists
    fn daily_record(&self, category: Category, day: NaiveDate) -> Result<Option<ContentRecord>>;

    /// Atomically delete every record of the record's (category, day),
    /// insert the record, and add its body to the seen ledger if absent.
    /// Nothing is written unless all three steps succeed.
    fn replace_daily_record(&self, record: &ContentRecord) -> Result<ReplaceOutcome>;

    /// Delete the records of (category, day); returns how many were removed
    fn clear_day(&self, category: Category, day: NaiveDate) -> Result<u64>;

    /// Records matching the filter, newest day first
    fn list_records(&self, filter: RecordFilter) -> Result<Vec<ContentRecord>>;

    // === Seen ledger ===

    /// Every body already shown for the category, oldest first
    fn seen_content(&self, category: Category) -> Result<Vec<SeenContent>>;

    // === Aggregates ===

    /// Record counts grouped by category (only categories with records)
    fn category_stats(&self) -> Result<BTreeMap<Category, CategoryStats>>;

    /// Get database statistics
    fn stats(&self) -> Result<StorageStats>;
}
