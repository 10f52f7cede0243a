use crate::categories::Category;
use crate::error::{AlmanacError, Result};
use crate::storage::filters::{CategoryStats, RecordFilter, StorageStats};
use crate::storage::traits::{ReplaceOutcome, Storage};
use crate::types::{join_key_points, split_key_points, ContentRecord, RecordId, SeenContent};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use log::{debug, info};
use redb::{Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Table definitions
const RECORDS: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("records");

// Secondary index: (category, days since CE) -> record ids
const RECORDS_BY_DAY: MultimapTableDefinition<(&str, i32), &[u8; 16]> =
    MultimapTableDefinition::new("records_by_day");

// Seen ledger: (category, body) -> first seen, unix millis
const SEEN: TableDefinition<(&str, &str), i64> = TableDefinition::new("seen_content");

// Metadata table
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_VERSION_KEY: &str = "schema_version";

/// On-disk shape of a record. Key points live in one comma-joined column.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: RecordId,
    category: String,
    body: String,
    interpretation: String,
    key_words: String,
    occurred_on: NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<&ContentRecord> for StoredRecord {
    fn from(record: &ContentRecord) -> Self {
        Self {
            id: record.id,
            category: record.category.as_str().to_string(),
            body: record.body.clone(),
            interpretation: record.interpretation.clone(),
            key_words: join_key_points(&record.key_points),
            occurred_on: record.occurred_on,
            created_at: record.created_at,
        }
    }
}

impl TryFrom<StoredRecord> for ContentRecord {
    type Error = AlmanacError;

    fn try_from(row: StoredRecord) -> Result<Self> {
        let category = row.category.parse::<Category>().map_err(|_| {
            AlmanacError::Persistence(format!(
                "record {} has unknown category '{}'",
                row.id, row.category
            ))
        })?;
        Ok(ContentRecord {
            id: row.id,
            category,
            body: row.body,
            interpretation: row.interpretation,
            key_points: split_key_points(&row.key_words),
            occurred_on: row.occurred_on,
            created_at: row.created_at,
        })
    }
}

/// Redb-based storage implementation
pub struct RedbStorage {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbStorage {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AlmanacError::Persistence(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let is_new = !path.exists();
        let db = Database::create(&path)?;

        if !is_new {
            Self::check_schema_version(&db)?;
        }

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RECORDS)?;
            let _ = write_txn.open_multimap_table(RECORDS_BY_DAY)?;
            let _ = write_txn.open_table(SEEN)?;
            let mut meta = write_txn.open_table(META)?;
            if is_new {
                meta.insert(SCHEMA_VERSION_KEY, CURRENT_SCHEMA_VERSION.to_string().as_bytes())?;
            }
        }
        write_txn.commit()?;

        if is_new {
            info!("Created content database at {:?}", path);
        }

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Refuse to open a database written with a different schema.
    fn check_schema_version(db: &Database) -> Result<()> {
        let read_txn = db.begin_read()?;
        let meta = read_txn.open_table(META).map_err(|_| {
            AlmanacError::Persistence("Database has no metadata table; refusing to open".into())
        })?;

        let stored = match meta.get(SCHEMA_VERSION_KEY)? {
            Some(raw) => std::str::from_utf8(raw.value())
                .ok()
                .and_then(|s| s.parse::<u32>().ok()),
            None => None,
        };

        match stored {
            Some(v) if v == CURRENT_SCHEMA_VERSION => Ok(()),
            Some(v) => Err(AlmanacError::Persistence(format!(
                "Database schema v{} does not match this binary (v{})",
                v, CURRENT_SCHEMA_VERSION
            ))),
            None => Err(AlmanacError::Persistence(
                "Database has no schema version; refusing to open".into(),
            )),
        }
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn day_key(day: NaiveDate) -> i32 {
        day.num_days_from_ce()
    }

    fn serialize_record(record: &ContentRecord) -> Result<Vec<u8>> {
        bincode::serialize(&StoredRecord::from(record)).map_err(AlmanacError::from)
    }

    fn deserialize_record(bytes: &[u8]) -> Result<ContentRecord> {
        let row: StoredRecord = bincode::deserialize(bytes)?;
        ContentRecord::try_from(row)
    }

    /// Remove every record of (category, day) inside an open write transaction.
    fn delete_day_in(
        txn: &redb::WriteTransaction,
        category: Category,
        day: NaiveDate,
    ) -> Result<u64> {
        let ids: Vec<[u8; 16]> = {
            let mut index = txn.open_multimap_table(RECORDS_BY_DAY)?;
            let removed = index.remove_all((category.as_str(), Self::day_key(day)))?;
            removed
                .map(|guard| guard.map(|g| *g.value()))
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut records = txn.open_table(RECORDS)?;
        let mut deleted = 0;
        for id in &ids {
            if records.remove(id)?.is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

impl Storage for RedbStorage {
    fn daily_record(&self, category: Category, day: NaiveDate) -> Result<Option<ContentRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_multimap_table(RECORDS_BY_DAY)?;
        let records = read_txn.open_table(RECORDS)?;

        let mut found: Option<ContentRecord> = None;
        for guard in index.get((category.as_str(), Self::day_key(day)))? {
            let id = *guard?.value();
            if let Some(bytes) = records.get(&id)? {
                let record = Self::deserialize_record(bytes.value())?;
                // Latest wins if a race ever left more than one row behind
                if found.as_ref().map_or(true, |f| record.created_at > f.created_at) {
                    found = Some(record);
                }
            }
        }
        Ok(found)
    }

    fn replace_daily_record(&self, record: &ContentRecord) -> Result<ReplaceOutcome> {
        let bytes = Self::serialize_record(record)?;
        let id_bytes = *record.id.as_bytes();

        // Dropping an uncommitted write transaction aborts it, so every early
        // return below leaves the store untouched.
        let write_txn = self.db.begin_write()?;

        let replaced = Self::delete_day_in(&write_txn, record.category, record.occurred_on)?;

        {
            let mut records = write_txn.open_table(RECORDS)?;
            records.insert(&id_bytes, bytes.as_slice())?;
        }
        {
            let mut index = write_txn.open_multimap_table(RECORDS_BY_DAY)?;
            index.insert(
                (record.category.as_str(), Self::day_key(record.occurred_on)),
                &id_bytes,
            )?;
        }

        let newly_seen = {
            let mut seen = write_txn.open_table(SEEN)?;
            let key = (record.category.as_str(), record.body.as_str());
            if seen.get(key)?.is_some() {
                false
            } else {
                seen.insert(key, record.created_at.timestamp_millis())?;
                true
            }
        };

        write_txn.commit()?;

        if replaced > 0 {
            debug!(
                "Replaced {} existing {} record(s) for {}",
                replaced, record.category, record.occurred_on
            );
        }

        Ok(ReplaceOutcome {
            replaced,
            newly_seen,
        })
    }

    fn clear_day(&self, category: Category, day: NaiveDate) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        let deleted = Self::delete_day_in(&write_txn, category, day)?;
        write_txn.commit()?;
        Ok(deleted)
    }

    fn list_records(&self, filter: RecordFilter) -> Result<Vec<ContentRecord>> {
        let read_txn = self.db.begin_read()?;
        let records = read_txn.open_table(RECORDS)?;

        let mut out = Vec::new();
        for item in records.iter()? {
            let (_, value) = item?;
            let record = Self::deserialize_record(value.value())?;
            if filter.matches(record.category, record.occurred_on) {
                out.push(record);
            }
        }

        // Newest day first, then newest insert
        out.sort_by(|a, b| {
            b.occurred_on
                .cmp(&a.occurred_on)
                .then(b.created_at.cmp(&a.created_at))
        });

        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn seen_content(&self, category: Category) -> Result<Vec<SeenContent>> {
        let read_txn = self.db.begin_read()?;
        let seen = read_txn.open_table(SEEN)?;

        let mut out = Vec::new();
        for item in seen.iter()? {
            let (key, value) = item?;
            let (cat, body) = key.value();
            if cat != category.as_str() {
                continue;
            }
            let first_seen_at =
                DateTime::<Utc>::from_timestamp_millis(value.value()).unwrap_or_default();
            out.push(SeenContent {
                category,
                body: body.to_string(),
                first_seen_at,
            });
        }

        out.sort_by(|a, b| a.first_seen_at.cmp(&b.first_seen_at));
        Ok(out)
    }

    fn category_stats(&self) -> Result<BTreeMap<Category, CategoryStats>> {
        let mut days: BTreeMap<Category, (u64, HashSet<NaiveDate>)> = BTreeMap::new();
        for record in self.list_records(RecordFilter::new())? {
            let entry = days.entry(record.category).or_default();
            entry.0 += 1;
            entry.1.insert(record.occurred_on);
        }

        Ok(days
            .into_iter()
            .map(|(category, (total, unique))| {
                (
                    category,
                    CategoryStats {
                        total_days: total,
                        unique_days: unique.len() as u64,
                    },
                )
            })
            .collect())
    }

    fn stats(&self) -> Result<StorageStats> {
        let read_txn = self.db.begin_read()?;
        let mut record_count = 0u64;
        for item in read_txn.open_table(RECORDS)?.iter()? {
            item?;
            record_count += 1;
        }
        let mut seen_count = 0u64;
        for item in read_txn.open_table(SEEN)?.iter()? {
            item?;
            seen_count += 1;
        }
        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(StorageStats {
            record_count,
            seen_count,
            db_size_bytes,
        })
    }
}
