mod filters;
mod redb_storage;
mod traits;

pub use filters::{CategoryStats, RecordFilter, StorageStats};
pub use redb_storage::{RedbStorage, CURRENT_SCHEMA_VERSION};
pub use traits::{ReplaceOutcome, Storage};
