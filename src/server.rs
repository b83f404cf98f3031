//! HTTP read API for dashboard front-ends.
//!
//! This module serves the query layer over HTTP:
//! - `GET /health`
//! - `GET /subjects` (probes the telemetry source)
//! - `GET /subjects/:id` (person details)
//! - `GET /subjects/:id/latest`
//! - `GET /subjects/:id/window?minutes=N&source=history|anomaly`
//! - `GET /subjects/:id/table?source=history|anomaly`
//! - `GET /stats`
//!
//! # Architecture
//!
//! ```text
//! Dashboard ──→ GET /subjects/:id/... ──→ TelemetryQuery ──→ TelemetryStore ←── Poller
//! ```

use crate::core::{SeriesPoint, StoreKind};
use crate::query::{
    list_subjects, subject_profile, LivePoint, SubjectEntry, TableRow, TelemetryQuery,
};
use crate::source::{SnapshotSource, SubjectId, SubjectProfile};
use crate::stats::{IngestSnapshot, SharedIngestStats};
use axum::{
    extract::{Path, Query, State},
    http::{request::Parts, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Default chart lookback when the caller does not pass `minutes`.
pub const DEFAULT_WINDOW_MINUTES: i64 = 2;

/// Largest accepted lookback (one year).
const MAX_WINDOW_MINUTES: i64 = 60 * 24 * 366;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// IDs probed by `/subjects`
    pub directory_ids: Vec<SubjectId>,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, directory_ids: Vec<SubjectId>) -> Self {
        Self {
            port,
            directory_ids,
        }
    }
}

/// Shared server state
pub struct ServerState {
    query: TelemetryQuery,
    source: Arc<dyn SnapshotSource>,
    stats: SharedIngestStats,
    directory_ids: Vec<SubjectId>,
}

impl ServerState {
    /// Create new server state
    pub fn new(
        config: &ServerConfig,
        query: TelemetryQuery,
        source: Arc<dyn SnapshotSource>,
        stats: SharedIngestStats,
    ) -> Self {
        Self {
            query,
            source,
            stats,
            directory_ids: config.directory_ids.clone(),
        }
    }
}

/// Query parameters selecting a log.
#[derive(Debug, Deserialize)]
pub struct SourceParams {
    pub source: Option<String>,
}

/// Query parameters of the window endpoint.
#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub minutes: Option<i64>,
    pub source: Option<String>,
}

/// Window endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WindowResponse {
    pub subject_id: SubjectId,
    pub source: StoreKind,
    pub minutes: i64,
    pub now: DateTime<FixedOffset>,
    pub series: Vec<SeriesPoint>,
    pub anomalies: Vec<DateTime<FixedOffset>>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub subjects: usize,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn parse_source(source: Option<&str>) -> Result<StoreKind, ApiError> {
    match source {
        None => Ok(StoreKind::History),
        Some(s) => s.parse().map_err(|e: String| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e,
                    code: "INVALID_SOURCE".to_string(),
                }),
            )
        }),
    }
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subjects: state.query.store().subjects().len(),
    })
}

/// GET /subjects
async fn subjects(State(state): State<Arc<ServerState>>) -> Json<Vec<SubjectEntry>> {
    Json(list_subjects(state.source.as_ref(), &state.directory_ids).await)
}

/// GET /subjects/:id
async fn profile(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SubjectId>,
) -> Result<Json<SubjectProfile>, ApiError> {
    subject_profile(state.source.as_ref(), id)
        .await
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: format!("Failed to load details of subject {id}"),
                    code: "SOURCE_ERROR".to_string(),
                }),
            )
        })
}

/// GET /subjects/:id/latest
async fn latest(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SubjectId>,
) -> Json<Vec<LivePoint>> {
    Json(state.query.get_latest(id))
}

/// GET /subjects/:id/window
///
/// The caller owns the lookback; asking for more than the history holds
/// returns whatever is retained.
async fn window(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SubjectId>,
    Query(params): Query<WindowParams>,
) -> Result<Json<WindowResponse>, ApiError> {
    let kind = parse_source(params.source.as_deref())?;
    let minutes = params
        .minutes
        .unwrap_or(DEFAULT_WINDOW_MINUTES)
        .clamp(0, MAX_WINDOW_MINUTES);
    let duration = Duration::minutes(minutes);
    let now = state.query.now();

    Ok(Json(WindowResponse {
        subject_id: id,
        source: kind,
        minutes,
        series: state.query.get_window_at(id, kind, duration, &now),
        anomalies: state.query.anomaly_markers_at(id, duration, &now),
        now,
    }))
}

/// GET /subjects/:id/table
async fn table(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<SubjectId>,
    Query(params): Query<SourceParams>,
) -> Result<Json<Vec<TableRow>>, ApiError> {
    let kind = parse_source(params.source.as_deref())?;
    Ok(Json(state.query.get_table_rows(id, kind)))
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<IngestSnapshot> {
    Json(state.stats.snapshot())
}

/// Whether `origin` is a local dashboard: `http://localhost` or
/// `http://127.0.0.1`, on any port.
fn is_loopback_origin(origin: &str) -> bool {
    let Some(rest) = origin
        .strip_prefix("http://localhost")
        .or_else(|| origin.strip_prefix("http://127.0.0.1"))
    else {
        return false;
    };
    match rest.strip_prefix(':') {
        None => rest.is_empty(),
        Some(port) => !port.is_empty() && port.parse::<u16>().is_ok(),
    }
}

/// Build the router without binding a socket.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/subjects", get(subjects))
        .route("/subjects/:id", get(profile))
        .route("/subjects/:id/latest", get(latest))
        .route("/subjects/:id/window", get(window))
        .route("/subjects/:id/table", get(table))
        .route("/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(
                    |origin: &HeaderValue, _: &Parts| {
                        origin.to_str().map(is_loopback_origin).unwrap_or(false)
                    },
                ))
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(Arc::new(state));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Read API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
