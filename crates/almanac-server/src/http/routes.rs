use super::{ApiResponse, AppResult, AppState};
use crate::config::Environment;
use almanac_core::{
    Category, ContentRecord, Envelope, HistoryEntry, RecordFilter, SchedulerState, Storage,
    StorageStats, SweepReport, CURRENT_SCHEMA_VERSION,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

const MOTTO: &str = "不积跬步，无以至千里；不积小流，无以成江海";
const DEBUG_RECORD_LIMIT: usize = 20;

pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/today-learning/:category", get(today))
        .route("/api/learning-history", get(history_all))
        .route("/api/learning-history/:category", get(history_by_category))
        .route("/api/stats", get(stats));

    if state.environment == Environment::Development {
        router = router
            .route("/debug/records", get(debug_records))
            .route("/debug/learned-content", get(debug_learned_content))
            .route("/debug/database-info", get(debug_database_info))
            .route("/debug/system-status", get(debug_system_status))
            .route("/debug/clear-today/:category", post(debug_clear_today))
            .route("/debug/force-generate/:category", post(debug_force_generate))
            .route("/debug/trigger-update", post(debug_trigger_update));
    }

    router
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("handler panicked");
    ApiResponse(Envelope::<()>::server_error()).into_response()
}

async fn not_found() -> ApiResponse<()> {
    ApiResponse(Envelope::failure("NOT_FOUND", "No such route", Vec::new()))
}

// ── Public API ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct IndexResponse {
    message: &'static str,
    version: &'static str,
    supported_types: Vec<&'static str>,
}

async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        message: MOTTO,
        version: env!("CARGO_PKG_VERSION"),
        supported_types: Category::names(),
    })
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse(state.almanac.health().await)
}

async fn today(State(state): State<AppState>, Path(category): Path<String>) -> impl IntoResponse {
    ApiResponse(state.almanac.today(&category).await)
}

#[derive(Deserialize)]
struct HistoryQuery {
    /// Kept as text so a malformed value falls back to the default limit.
    limit: Option<String>,
}

impl HistoryQuery {
    fn limit(&self) -> Option<i64> {
        self.limit.as_deref().and_then(|s| s.trim().parse().ok())
    }
}

async fn history_all(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    ApiResponse(state.almanac.history(None, query.limit()).await)
}

async fn history_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    ApiResponse(state.almanac.history(Some(&category), query.limit()).await)
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse(state.almanac.global_stats().await)
}

// ── Debug (development only) ─────────────────────────────────────────────────

async fn debug_records(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<ContentRecord>>> {
    let records = state
        .storage()
        .list_records(RecordFilter::new().with_limit(DEBUG_RECORD_LIMIT))?;
    Ok(ApiResponse(Envelope::ok("Latest records", records)))
}

async fn debug_learned_content(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<BTreeMap<Category, Vec<String>>>> {
    let mut seen = BTreeMap::new();
    for category in Category::ALL {
        let bodies = state
            .storage()
            .seen_content(category)?
            .into_iter()
            .map(|s| s.body)
            .collect();
        seen.insert(category, bodies);
    }
    Ok(ApiResponse(Envelope::ok("Already shown content", seen)))
}

#[derive(Serialize)]
struct DatabaseInfo {
    path: String,
    schema_version: u32,
    #[serde(flatten)]
    stats: StorageStats,
}

async fn debug_database_info(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<DatabaseInfo>> {
    let storage = state.storage();
    Ok(ApiResponse(Envelope::ok(
        "Database info",
        DatabaseInfo {
            path: storage.path().display().to_string(),
            schema_version: CURRENT_SCHEMA_VERSION,
            stats: storage.stats()?,
        },
    )))
}

#[derive(Serialize)]
struct SystemStatus {
    version: &'static str,
    environment: Environment,
    uptime_seconds: u64,
    scheduler_state: SchedulerState,
    next_update: String,
    last_sweep: Option<SweepReport>,
}

async fn debug_system_status(State(state): State<AppState>) -> ApiResponse<SystemStatus> {
    ApiResponse(Envelope::ok(
        "System status",
        SystemStatus {
            version: env!("CARGO_PKG_VERSION"),
            environment: state.environment,
            uptime_seconds: state.start_time.elapsed().as_secs(),
            scheduler_state: state.scheduler.state(),
            next_update: state.scheduler.next_deadline().to_rfc3339(),
            last_sweep: state.scheduler.last_report(),
        },
    ))
}

#[derive(Serialize)]
struct Cleared {
    #[serde(rename = "type")]
    category: Category,
    removed: u64,
}

async fn debug_clear_today(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResponse<Cleared> {
    let category: Category = match category.parse() {
        Ok(c) => c,
        Err(e) => return ApiResponse(Envelope::from_error(&e)),
    };
    let envelope = match state.almanac.resolver().clear_today(category).await {
        Ok(removed) => Envelope::ok("Cleared today's record", Cleared { category, removed }),
        Err(e) => Envelope::from_error(&e),
    };
    ApiResponse(envelope)
}

async fn debug_force_generate(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResponse<HistoryEntry> {
    let category: Category = match category.parse() {
        Ok(c) => c,
        Err(e) => return ApiResponse(Envelope::from_error(&e)),
    };
    let envelope = match state.almanac.resolver().regenerate(category).await {
        Ok(record) => Envelope::ok("Generated new content", HistoryEntry::from(record)),
        Err(e) => {
            error!("force-generate {} failed: {}", category, e);
            Envelope::from_error(&e)
        }
    };
    ApiResponse(envelope)
}

#[derive(Serialize)]
struct Triggered {
    triggered: bool,
}

async fn debug_trigger_update(State(state): State<AppState>) -> ApiResponse<Triggered> {
    // The sweep reports through its own logs; the receiver is not awaited
    let _ = state.scheduler.trigger_now();
    ApiResponse(Envelope::ok("Update sweep started", Triggered { triggered: true }))
}
