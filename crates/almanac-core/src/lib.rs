pub mod types;
pub mod storage;
pub mod error;
pub mod categories;
pub mod extract;
pub mod clock;
pub mod provider;
pub mod resolver;
pub mod scheduler;
pub mod api;

pub use error::{AlmanacError, ExtractionError, Result};
pub use types::*;
pub use categories::{Category, CategorySchema};
pub use storage::{
    CategoryStats, RecordFilter, RedbStorage, ReplaceOutcome, Storage, StorageStats,
    CURRENT_SCHEMA_VERSION,
};
pub use extract::extract;
pub use clock::{next_midnight_after, Clock, FixedClock, SystemClock};
pub use provider::{system_prompt, ContentProvider, USER_INSTRUCTION};
pub use resolver::{DailyResolver, Resolution};
pub use scheduler::{
    run_sweep, ContentScheduler, SchedulerConfig, SchedulerState, ShutdownOutcome, SweepFailure,
    SweepReport,
};
pub use api::{
    Almanac, CategorySummary, Envelope, GlobalStats, Health, History, HistoryEntry, TodayContent,
};
