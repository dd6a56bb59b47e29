use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Result, ScanError};
use crate::registry::JobRegistry;
use crate::types::{HistoryEntry, ScanRequest, ScanType};

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Clone, Debug)]
pub struct AppState {
    registry: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }
}

#[derive(Debug, Serialize)]
pub struct ScanAccepted {
    pub status: &'static str,
    pub scan_id: String,
    pub targets: Vec<String>,
    pub ports: Vec<u16>,
    pub scan_type: ScanType,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub status: &'static str,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Errors rendered as `{status: "error", message}` with a matching code.
#[derive(Debug)]
pub enum ApiError {
    Engine(ScanError),
    /// Body that does not deserialize into the expected request.
    BadBody(String),
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        Self::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self::BadBody(r.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            ApiError::BadBody(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Engine(e) => {
                let code = match &e {
                    e if e.is_request_error() => StatusCode::BAD_REQUEST,
                    ScanError::NotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (code, e.to_string())
            }
        };
        let body = json!({ "status": "error", "message": message });
        (code, Json(body)).into_response()
    }
}

/// API routes plus the static UI directory as fallback.
pub fn router(registry: Arc<JobRegistry>) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/scan/{id}/status", get(get_status))
        .route("/scan/{id}/results", get(get_results))
        .route("/scan/{id}/cancel", post(post_cancel))
        .route("/scan-history", get(get_history))
        .route("/scan-types", get(get_scan_types))
        .with_state(AppState::new(registry));

    let static_svc = ServeDir::new("ui").append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, registry: Arc<JobRegistry>) -> Result<()> {
    let app = router(registry);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "serving API");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn post_scan(
    State(app): State<AppState>,
    payload: std::result::Result<Json<ScanRequest>, JsonRejection>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let scan_id = app.registry.submit(&req).await?;
    let job = app.registry.get(&scan_id).await?;
    let plan = job.plan();
    let body = ScanAccepted {
        status: "success",
        scan_id,
        targets: plan.targets().to_vec(),
        ports: plan.ports().to_vec(),
        scan_type: plan.scan_type(),
    };
    Ok((StatusCode::ACCEPTED, Json(body)))
}

async fn get_status(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    Ok(Json(app.registry.status(&id).await?))
}

async fn get_results(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    Ok(Json(app.registry.results(&id).await?))
}

async fn post_cancel(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    Ok(Json(app.registry.cancel(&id).await?))
}

async fn get_history(
    State(app): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    let history = app
        .registry
        .history(q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await;
    Json(HistoryResponse {
        status: "success",
        history,
    })
}

async fn get_scan_types() -> impl IntoResponse {
    Json(ScanType::profiles())
}
