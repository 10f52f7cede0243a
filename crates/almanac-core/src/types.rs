use crate::categories::Category;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type alias for record identifiers
pub type RecordId = Uuid;

/// Delimiter used when key points are flattened into a single text column.
pub const KEY_POINT_DELIMITER: &str = ",";

/// The day's learning content for one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentRecord {
    /// UUIDv7, so ids sort by creation time.
    pub id: RecordId,

    pub category: Category,

    /// The primary learning text (a proverb, a verse, a classical passage).
    pub body: String,

    /// Explanation of the body.
    pub interpretation: String,

    /// Ordered "term: meaning" strings.
    pub key_points: Vec<String>,

    /// Local calendar day this record belongs to.
    pub occurred_on: NaiveDate,

    pub created_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Build a record for `day` from normalized provider output.
    ///
    /// Key points go through the same join/split round trip the store
    /// applies, so a fresh record equals its later re-read.
    pub fn new(category: Category, content: NormalizedContent, day: NaiveDate) -> Self {
        let key_points = split_key_points(&join_key_points(&content.key_points));
        Self {
            id: Uuid::now_v7(),
            category,
            body: content.content,
            interpretation: content.interpretation,
            key_points,
            occurred_on: day,
            created_at: Utc::now(),
        }
    }
}

/// One entry in the per-category "already shown" ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeenContent {
    pub category: Category,
    pub body: String,
    pub first_seen_at: DateTime<Utc>,
}

/// Provider output after extraction, before it becomes a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedContent {
    pub content: String,
    pub interpretation: String,
    pub key_points: Vec<String>,
}

impl NormalizedContent {
    /// Rewrite key points into the form the store keeps, so validation sees
    /// exactly what will be persisted.
    pub fn into_stored_form(mut self) -> Self {
        self.key_points = split_key_points(&join_key_points(&self.key_points));
        self
    }

    /// Business rules a record must satisfy. Returns every violation.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.content.trim().is_empty() {
            violations.push("content must not be empty".to_string());
        }
        if self.interpretation.trim().is_empty() {
            violations.push("interpretation must not be empty".to_string());
        }
        if self.key_points.is_empty() {
            violations.push("key points must not be empty".to_string());
        }
        violations
    }
}

pub fn join_key_points(points: &[String]) -> String {
    points.join(KEY_POINT_DELIMITER)
}

/// Inverse of [`join_key_points`]; drops empty and whitespace-only entries.
pub fn split_key_points(joined: &str) -> Vec<String> {
    joined
        .split(KEY_POINT_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
