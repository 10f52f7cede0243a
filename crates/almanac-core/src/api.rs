use crate::categories::Category;
use crate::clock::Clock;
use crate::error::{AlmanacError, Result};
use crate::provider::ContentProvider;
use crate::resolver::DailyResolver;
use crate::storage::{RedbStorage, Storage};
use crate::types::ContentRecord;
use futures::FutureExt;
use log::{error, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Error code for failures caught at the panic boundary.
pub const SERVER_ERROR: &str = "SERVER_ERROR";

/// Success/failure wrapper returned by every facade call.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error_code: None,
            errors: Vec::new(),
        }
    }

    pub fn failure(code: &str, message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error_code: Some(code.to_string()),
            errors,
        }
    }

    pub fn from_error(err: &AlmanacError) -> Self {
        let (message, errors) = match err {
            AlmanacError::InvalidCategory(_) => (
                "Unsupported content type",
                vec![format!("supported types: {}", Category::names().join(", "))],
            ),
            AlmanacError::Provider(_) => ("Content provider unavailable", err.details()),
            AlmanacError::Extraction(_) => ("Could not read the provider response", err.details()),
            AlmanacError::Validation(_) => ("Generated content failed validation", err.details()),
            _ => ("Storage failure", err.details()),
        };
        Self::failure(err.code(), message, errors)
    }

    pub fn server_error() -> Self {
        Self::failure(SERVER_ERROR, "Internal server error", Vec::new())
    }

    /// The error code, if this is a failure envelope.
    pub fn code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }
}

/// Today's content as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayContent {
    #[serde(rename = "type")]
    pub category: Category,
    pub type_name: String,
    pub content: String,
    pub interpretation: String,
    pub key_words: Vec<String>,
    /// `YYYY-MM-DD`
    pub date: String,
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub category: Category,
    pub type_name: String,
    pub content: String,
    pub interpretation: String,
    pub key_words: Vec<String>,
    pub date: String,
}

impl From<ContentRecord> for HistoryEntry {
    fn from(record: ContentRecord) -> Self {
        Self {
            category: record.category,
            type_name: record.category.display_name().to_string(),
            content: record.body,
            interpretation: record.interpretation,
            key_words: record.key_points,
            date: record.occurred_on.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct History {
    pub total: usize,
    pub records: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub type_name: &'static str,
    pub total_days: u64,
    pub unique_days: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub stats: BTreeMap<Category, CategorySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub database: &'static str,
    pub supported_types: Vec<&'static str>,
}

/// Clamp a caller-supplied history limit: absent or non-positive means the
/// default, anything above the cap is cut to the cap.
pub fn normalize_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(n) if n > 0 => (n as usize).min(MAX_HISTORY_LIMIT),
        _ => DEFAULT_HISTORY_LIMIT,
    }
}

/// Request-facing entry point. Every call returns an [`Envelope`] and never
/// panics: unexpected faults become a `SERVER_ERROR` failure.
///
/// # Example
/// ```rust,ignore
/// let almanac = Almanac::open("./data/almanac.redb", provider)?;
/// let today = almanac.today("english").await;
/// assert!(today.success);
/// ```
pub struct Almanac<S: Storage + 'static> {
    resolver: Arc<DailyResolver<S>>,
}

impl Almanac<RedbStorage> {
    /// Open (or create) the database at `path` and serve it with `provider`.
    pub fn open(path: impl AsRef<Path>, provider: Arc<dyn ContentProvider>) -> Result<Self> {
        let storage = Arc::new(RedbStorage::open(path.as_ref())?);
        Ok(Self::new(Arc::new(DailyResolver::new(storage, provider))))
    }
}

impl<S: Storage + 'static> Almanac<S> {
    pub fn new(resolver: Arc<DailyResolver<S>>) -> Self {
        Self { resolver }
    }

    pub fn with_clock(
        storage: Arc<S>,
        provider: Arc<dyn ContentProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(Arc::new(DailyResolver::with_clock(storage, provider, clock)))
    }

    pub fn resolver(&self) -> &Arc<DailyResolver<S>> {
        &self.resolver
    }

    /// Today's content for `category`, generating it on first request.
    pub async fn today(&self, category: &str) -> Envelope<TodayContent> {
        let resolver = self.resolver.clone();
        let category = category.to_string();
        guarded("today", "Fetched today's content", async move {
            let resolution = resolver.resolve_today(&category).await?;
            let record = resolution.record;
            Ok(TodayContent {
                category: record.category,
                type_name: record.category.display_name().to_string(),
                content: record.body,
                interpretation: record.interpretation,
                key_words: record.key_points,
                date: record.occurred_on.format("%Y-%m-%d").to_string(),
                from_cache: resolution.served_from_cache,
            })
        })
        .await
    }

    /// Stored records, newest first, optionally for one category.
    pub async fn history(&self, category: Option<&str>, limit: Option<i64>) -> Envelope<History> {
        let resolver = self.resolver.clone();
        let category = category.map(str::to_string);
        guarded("history", "Fetched learning history", async move {
            let category = category.as_deref().map(str::parse::<Category>).transpose()?;
            let records: Vec<HistoryEntry> = resolver
                .history(category, normalize_limit(limit))?
                .into_iter()
                .map(HistoryEntry::from)
                .collect();
            Ok(History {
                total: records.len(),
                records,
            })
        })
        .await
    }

    /// Per-category record counts.
    pub async fn global_stats(&self) -> Envelope<GlobalStats> {
        let resolver = self.resolver.clone();
        guarded("global_stats", "Fetched statistics", async move {
            let stats = resolver
                .category_stats()?
                .into_iter()
                .map(|(category, counts)| {
                    (
                        category,
                        CategorySummary {
                            type_name: category.display_name(),
                            total_days: counts.total_days,
                            unique_days: counts.unique_days,
                        },
                    )
                })
                .collect();
            Ok(GlobalStats { stats })
        })
        .await
    }

    pub async fn health(&self) -> Envelope<Health> {
        let resolver = self.resolver.clone();
        guarded("health", "Service is healthy", async move {
            resolver.storage().stats()?;
            Ok(Health {
                status: "ok",
                database: "connected",
                supported_types: Category::names(),
            })
        })
        .await
    }
}

/// Explicit error boundary around one facade call.
async fn guarded<T, F>(operation: &str, success_message: &str, fut: F) -> Envelope<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(data)) => Envelope::ok(success_message, data),
        Ok(Err(e)) => {
            if e.is_client_error() {
                warn!("{} rejected: {}", operation, e);
            } else {
                error!("{} failed: {}", operation, e);
            }
            Envelope::from_error(&e)
        }
        Err(_) => {
            error!("{} panicked; returning {}", operation, SERVER_ERROR);
            Envelope::server_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl ContentProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _category: Category, _already_shown: &[String]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl ContentProvider for PanickingProvider {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn generate(&self, _category: Category, _already_shown: &[String]) -> Result<String> {
            panic!("provider exploded");
        }
    }

    fn create_almanac(provider: Arc<dyn ContentProvider>) -> (Almanac<RedbStorage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(RedbStorage::open(temp_dir.path().join("test.redb")).unwrap());
        let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()));
        (Almanac::with_clock(storage, provider, clock), temp_dir)
    }

    const POEM: &str = r#"{"poem":"白日依山尽","interpretation":"The sun sets behind the hills","key_words":[{"word":"依","meaning":"lean on"}]}"#;

    #[tokio::test]
    async fn test_today_envelope_shape() {
        let (almanac, _temp) = create_almanac(Arc::new(FixedProvider(POEM)));

        let first = almanac.today("chinese").await;
        assert!(first.success);
        let data = first.data.unwrap();
        assert_eq!(data.date, "2026-10-17");
        assert_eq!(data.key_words, vec!["依: lean on".to_string()]);
        assert!(!data.from_cache);

        let json = serde_json::to_value(almanac.today("chinese").await).unwrap();
        assert_eq!(json["data"]["type"], "chinese");
        assert_eq!(json["data"]["type_name"], "Classical Chinese poetry");
        assert_eq!(json["data"]["from_cache"], true);
        assert!(json.get("error_code").is_none());
    }

    #[tokio::test]
    async fn test_invalid_category_envelope() {
        let (almanac, _temp) = create_almanac(Arc::new(FixedProvider(POEM)));

        let env = almanac.today("math").await;
        assert!(!env.success);
        assert_eq!(env.code(), Some("INVALID_CATEGORY"));
        assert_eq!(env.errors, vec!["supported types: english, chinese, tcm".to_string()]);

        let env = almanac.history(Some("latin"), None).await;
        assert_eq!(env.code(), Some("INVALID_CATEGORY"));
    }

    #[tokio::test]
    async fn test_panic_becomes_server_error() {
        let (almanac, _temp) = create_almanac(Arc::new(PanickingProvider));

        let env = almanac.today("english").await;
        assert!(!env.success);
        assert_eq!(env.code(), Some(SERVER_ERROR));

        // The facade keeps serving after a panic
        assert!(almanac.health().await.success);
    }

    #[tokio::test]
    async fn test_history_and_stats() {
        let (almanac, _temp) = create_almanac(Arc::new(FixedProvider(POEM)));
        almanac.today("chinese").await;

        let history = almanac.history(None, Some(-3)).await.data.unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.records[0].content, "白日依山尽");

        let stats = almanac.global_stats().await.data.unwrap();
        assert_eq!(stats.stats.len(), 1);
        assert_eq!(stats.stats[&Category::Chinese].total_days, 1);

        let json = serde_json::to_value(almanac.global_stats().await).unwrap();
        assert_eq!(json["data"]["stats"]["chinese"]["unique_days"], 1);
    }

    #[test]
    fn test_normalize_limit() {
        assert_eq!(normalize_limit(None), DEFAULT_HISTORY_LIMIT);
        assert_eq!(normalize_limit(Some(0)), DEFAULT_HISTORY_LIMIT);
        assert_eq!(normalize_limit(Some(-1)), DEFAULT_HISTORY_LIMIT);
        assert_eq!(normalize_limit(Some(25)), 25);
        assert_eq!(normalize_limit(Some(10_000)), MAX_HISTORY_LIMIT);
    }
}
