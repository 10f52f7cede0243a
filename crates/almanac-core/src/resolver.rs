//! Daily resolution: at most one record per category per local day.
//!
//! A cache hit returns the stored record. A miss asks the provider for
//! something new, extracts and validates it, then replaces the day's record
//! in one store transaction. Generation for a given (category, day) is
//! single-flight: concurrent callers wait for the first one and are then
//! served its committed record from the store.

use crate::categories::Category;
use crate::clock::{Clock, SystemClock};
use crate::error::{AlmanacError, Result};
use crate::extract::extract;
use crate::provider::ContentProvider;
use crate::storage::{CategoryStats, RecordFilter, Storage};
use crate::types::ContentRecord;
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

type FlightKey = (Category, NaiveDate);

/// The outcome of a `resolve_today` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: ContentRecord,
    pub served_from_cache: bool,
}

pub struct DailyResolver<S: Storage> {
    storage: Arc<S>,
    provider: Arc<dyn ContentProvider>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashMap<FlightKey, Arc<AsyncMutex<()>>>>,
}

impl<S: Storage> DailyResolver<S> {
    pub fn new(storage: Arc<S>, provider: Arc<dyn ContentProvider>) -> Self {
        Self::with_clock(storage, provider, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<S>,
        provider: Arc<dyn ContentProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            provider,
            clock,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Today's local calendar date according to the injected clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Today's record for `category`, generating it on a miss.
    pub async fn resolve_today(&self, category: &str) -> Result<Resolution> {
        let category: Category = category.parse()?;
        let today = self.today();

        if let Some(record) = self.storage.daily_record(category, today)? {
            debug!("Cache hit for {} on {}", category, today);
            return Ok(Resolution {
                record,
                served_from_cache: true,
            });
        }

        let flight = self.flight_lock(category, today);
        let _guard = flight.lock().await;

        // Whoever held the lock before us may have committed the record
        if let Some(record) = self.storage.daily_record(category, today)? {
            debug!("Served {} for {} from a concurrent generation", category, today);
            return Ok(Resolution {
                record,
                served_from_cache: true,
            });
        }

        debug!("Cache miss for {} on {}", category, today);
        let record = self.generate(category, today).await?;
        Ok(Resolution {
            record,
            served_from_cache: false,
        })
    }

    /// Generate and store a fresh record for today, ignoring any cached one.
    pub async fn regenerate(&self, category: Category) -> Result<ContentRecord> {
        let today = self.today();
        let flight = self.flight_lock(category, today);
        let _guard = flight.lock().await;
        self.generate(category, today).await
    }

    /// Stored records, newest day first.
    pub fn history(&self, category: Option<Category>, limit: usize) -> Result<Vec<ContentRecord>> {
        let mut filter = RecordFilter::new().with_limit(limit);
        if let Some(category) = category {
            filter = filter.with_category(category);
        }
        self.storage.list_records(filter)
    }

    pub fn category_stats(&self) -> Result<BTreeMap<Category, CategoryStats>> {
        self.storage.category_stats()
    }

    /// Drop today's record so the next request regenerates it.
    pub async fn clear_today(&self, category: Category) -> Result<u64> {
        let today = self.today();
        let flight = self.flight_lock(category, today);
        let _guard = flight.lock().await;
        let removed = self.storage.clear_day(category, today)?;
        info!("Cleared {} record(s) for {} on {}", removed, category, today);
        Ok(removed)
    }

    /// Caller must hold the flight lock for (category, day).
    async fn generate(&self, category: Category, day: NaiveDate) -> Result<ContentRecord> {
        let already_shown: Vec<String> = self
            .storage
            .seen_content(category)?
            .into_iter()
            .map(|seen| seen.body)
            .collect();

        debug!(
            "Requesting {} content from {} ({} already shown)",
            category,
            self.provider.name(),
            already_shown.len()
        );
        let raw = self.provider.generate(category, &already_shown).await?;

        let normalized = extract(&raw, category)?.into_stored_form();
        let violations = normalized.validate();
        if !violations.is_empty() {
            return Err(AlmanacError::Validation(violations));
        }

        let record = ContentRecord::new(category, normalized, day);
        let outcome = self.storage.replace_daily_record(&record)?;

        info!(
            "Generated {} content for {} (replaced {}, new to ledger: {})",
            category, day, outcome.replaced, outcome.newly_seen
        );
        Ok(record)
    }

    fn flight_lock(&self, category: Category, day: NaiveDate) -> Arc<AsyncMutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.retain(|(_, d), _| *d >= day);
        in_flight.entry((category, day)).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::RedbStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const ENGLISH: &str = r#"{"proverb":"Well begun is half done","interpretation":"Start strong","key_words":[{"word":"begun","meaning":"started"}]}"#;

    /// Returns the scripted payload, counting calls.
    struct ScriptedProvider {
        payload: String,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(payload: &str) -> Self {
            Self {
                payload: payload.to_string(),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(payload: &str, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(payload)
            }
        }
    }

    #[async_trait]
    impl ContentProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _category: Category, _already_shown: &[String]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.payload.clone())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn create_resolver(provider: Arc<ScriptedProvider>) -> (DailyResolver<RedbStorage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(RedbStorage::open(temp_dir.path().join("test.redb")).unwrap());
        let resolver = DailyResolver::with_clock(storage, provider, Arc::new(FixedClock::on(day())));
        (resolver, temp_dir)
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let provider = Arc::new(ScriptedProvider::new(ENGLISH));
        let (resolver, _temp) = create_resolver(provider.clone());

        let first = resolver.resolve_today("english").await.unwrap();
        assert!(!first.served_from_cache);
        assert_eq!(first.record.occurred_on, day());

        let second = resolver.resolve_today("English").await.unwrap();
        assert!(second.served_from_cache);
        assert_eq!(second.record, first.record);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_category_never_reaches_provider() {
        let provider = Arc::new(ScriptedProvider::new(ENGLISH));
        let (resolver, _temp) = create_resolver(provider.clone());

        let err = resolver.resolve_today("math").await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_lists_every_violation_and_stores_nothing() {
        // Passes extraction but has no key points
        let provider = Arc::new(ScriptedProvider::new(
            r#"{"poem":"P","interpretation":"I","key_words":[]}"#,
        ));
        let (resolver, _temp) = create_resolver(provider);

        let err = resolver.resolve_today("chinese").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.details(), vec!["key points must not be empty".to_string()]);
        assert!(resolver.history(None, 10).unwrap().is_empty());
        assert!(resolver.storage().seen_content(Category::Chinese).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_points_blank_after_normalisation_fail_validation() {
        let provider = Arc::new(ScriptedProvider::new(
            r#"{"proverb":"A","interpretation":"B","key_words":[" ", ","]}"#,
        ));
        let (resolver, _temp) = create_resolver(provider);

        let err = resolver.resolve_today("english").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.details(), vec!["key points must not be empty".to_string()]);
        assert!(resolver.storage().daily_record(Category::English, day()).unwrap().is_none());
        assert!(resolver.storage().seen_content(Category::English).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::new(r#"{"interpretation":"B"}"#));
        let (resolver, _temp) = create_resolver(provider);

        let err = resolver.resolve_today("english").await.unwrap_err();
        assert_eq!(err.code(), "EXTRACTION_ERROR");
    }

    #[tokio::test]
    async fn test_regenerate_replaces_todays_record() {
        let provider = Arc::new(ScriptedProvider::new(ENGLISH));
        let (resolver, _temp) = create_resolver(provider.clone());

        let first = resolver.resolve_today("english").await.unwrap().record;
        let second = resolver.regenerate(Category::English).await.unwrap();
        assert_ne!(first.id, second.id);

        let history = resolver.history(Some(Category::English), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, second.id);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_generate_once() {
        let provider = Arc::new(ScriptedProvider::slow(ENGLISH, Duration::from_millis(50)));
        let (resolver, _temp) = create_resolver(provider.clone());

        let (a, b) = tokio::join!(
            resolver.resolve_today("english"),
            resolver.resolve_today("english")
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.record, b.record);
        assert!(a.served_from_cache != b.served_from_cache);
    }

    #[tokio::test]
    async fn test_clear_today_forces_regeneration() {
        let provider = Arc::new(ScriptedProvider::new(ENGLISH));
        let (resolver, _temp) = create_resolver(provider.clone());

        resolver.resolve_today("english").await.unwrap();
        assert_eq!(resolver.clear_today(Category::English).await.unwrap(), 1);

        let again = resolver.resolve_today("english").await.unwrap();
        assert!(!again.served_from_cache);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
