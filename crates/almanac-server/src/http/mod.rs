mod routes;

pub use routes::create_router;

use crate::config::Environment;
use almanac_core::{Almanac, ContentScheduler, Envelope, RedbStorage};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub almanac: Arc<Almanac<RedbStorage>>,
    pub scheduler: Arc<ContentScheduler<RedbStorage>>,
    pub environment: Environment,
    pub start_time: Instant,
}

impl AppState {
    pub fn storage(&self) -> &Arc<RedbStorage> {
        self.almanac.resolver().storage()
    }
}

/// HTTP status for a failure envelope's error code.
pub fn status_for(code: Option<&str>) -> StatusCode {
    match code {
        None => StatusCode::OK,
        Some("INVALID_CATEGORY") => StatusCode::BAD_REQUEST,
        Some("NOT_FOUND") => StatusCode::NOT_FOUND,
        Some("PROVIDER_ERROR") | Some("EXTRACTION_ERROR") | Some("VALIDATION_ERROR") => {
            StatusCode::BAD_GATEWAY
        }
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON response wrapper: an envelope plus the status its code maps to.
pub struct ApiResponse<T>(pub Envelope<T>);

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code());
        (status, Json(self.0)).into_response()
    }
}

/// Custom error type for debug handlers
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiResponse(Envelope::<()>::failure(
            "SERVER_ERROR",
            "Internal server error",
            vec![format!("{:#}", self.0)],
        ))
        .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;
