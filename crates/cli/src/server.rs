//! HTTP surface: listing and sync endpoints over the core library.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use filemanager_core::explorer::{self, ListOptions};
use filemanager_core::models::{EntryInfo, FileInfo};
use filemanager_core::{ExploreError, FileSystem, SyncEngine, SyncError, SyncFailure};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub fs: Arc<dyn FileSystem>,
    pub engine: SyncEngine,
    pub default_depth: i32,
    pub show_hidden: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/list", get(list_files).options(preflight))
        .route("/api/files/list", get(list_children).options(preflight))
        .route("/api/sync", post(sync).options(preflight))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    copied: Option<Vec<String>>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl ToString) -> Self {
        Self {
            status,
            message: message.to_string(),
            copied: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({ "error": self.message });
        if let Some(copied) = self.copied {
            body["copied"] = serde_json::json!(copied);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<ExploreError> for ApiError {
    fn from(err: ExploreError) -> Self {
        let status = match err {
            ExploreError::InvalidPath | ExploreError::PatternInvalid(_) => StatusCode::BAD_REQUEST,
            ExploreError::PathNotFound(_) => StatusCode::NOT_FOUND,
            ExploreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ExploreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err)
    }
}

impl From<SyncFailure> for ApiError {
    fn from(failure: SyncFailure) -> Self {
        let status = match failure.error {
            SyncError::SameSourceDestination => StatusCode::BAD_REQUEST,
            SyncError::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %failure.error, job_id = ?failure.job_id, "sync request failed");
        }
        Self {
            status,
            message: failure.error.to_string(),
            copied: failure.job_id.map(|_| failure.copied),
        }
    }
}

fn internal_error<E: ToString>(e: E) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e)
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    dir: Option<String>,
    depth: Option<i32>,
    /// Regular expression applied to file names.
    pattern: Option<String>,
    /// Comma-separated globs.
    include: Option<String>,
    exclude: Option<String>,
    hidden: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChildrenParams {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    source: Option<String>,
    destination: Option<String>,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    #[serde(default)]
    force: bool,
}

fn split_globs(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "OK"
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// GET /api/list
async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<FileInfo>>, ApiError> {
    let options = ListOptions {
        depth: params.depth.unwrap_or(state.default_depth),
        include: split_globs(params.include.as_deref()),
        exclude: split_globs(params.exclude.as_deref()),
        regex_pattern: params.pattern.filter(|p| !p.is_empty()),
        show_hidden: params.hidden.unwrap_or(state.show_hidden),
    };
    let dir = params.dir.unwrap_or_default();
    let fs = state.fs.clone();
    let files = tokio::task::spawn_blocking(move || explorer::list(fs.as_ref(), &dir, &options))
        .await
        .map_err(internal_error)??;
    Ok(Json(files))
}

/// GET /api/files/list
async fn list_children(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChildrenParams>,
) -> Result<Json<Vec<EntryInfo>>, ApiError> {
    let dir = params.path.unwrap_or_default();
    let fs = state.fs.clone();
    let entries = tokio::task::spawn_blocking(move || explorer::list_children(fs.as_ref(), &dir))
        .await
        .map_err(internal_error)??;
    Ok(Json(entries))
}

/// POST /api/sync
async fn sync(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncQuery>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let req: SyncRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid request body: {e}")))?;
    let (source, destination) = match (req.source, req.destination) {
        (Some(s), Some(d)) if !s.trim().is_empty() && !d.trim().is_empty() => (s, d),
        _ => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "source and destination are required",
            ))
        }
    };

    let report = state
        .engine
        .sync_dirs(&source, &destination, req.force || query.force)
        .await?;
    tracing::info!(job_id = report.job_id, copied = report.copied.len(), "sync request done");
    Ok(StatusCode::NO_CONTENT)
}
