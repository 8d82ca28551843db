//! One-shot generation and the log/metric read side

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::generator::render_prometheus;
use crate::models::{
    ConfigMap, GenerateRequest, GenerateResponse, LogEntry, LogQuery, LogStats, Metric,
    MetricsQuery,
};

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsResponse {
    pub metrics: Vec<Metric>,
    pub count: usize,
}

/// Generate a burst of logs immediately
#[utoipa::path(
    post,
    path = "/api/v1/generate",
    tag = "logs",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Logs generated", body = GenerateResponse),
        (status = 400, description = "log_count out of range", body = super::response::ApiResponse),
    )
)]
pub async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> AppResult<Json<GenerateResponse>> {
    let max = state.config.max_generate_count;
    if req.log_count == 0 || req.log_count > max {
        return Err(AppError::Validation(format!(
            "log_count must be between 1 and {}",
            max
        )));
    }

    let params = req.config.unwrap_or_else(ConfigMap::new);
    let batch = state
        .logs
        .generate(req.log_count, req.scenario.as_deref(), &params);
    info!(generated = batch.len(), scenario = ?req.scenario, "Generated logs on demand");

    Ok(Json(GenerateResponse {
        status: "success".to_string(),
        generated: batch.len(),
        metrics_count: state.logs.metrics().len(),
        sample_log: batch.into_iter().next(),
    }))
}

/// Metric snapshot as JSON or Prometheus text
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    params(MetricsQuery),
    responses(
        (status = 200, description = "Prometheus exposition, or JSON with format=json", body = MetricsResponse),
    )
)]
pub async fn metrics_handler(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let metrics = state.logs.metrics();

    if query.format.as_deref() == Some("json") {
        let count = metrics.len();
        return Json(MetricsResponse { metrics, count }).into_response();
    }

    let mut body = render_prometheus(&metrics);
    if let Some(handle) = &state.prometheus {
        body.push_str(&handle.render());
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Most recent logs, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/logs",
    tag = "logs",
    params(LogQuery),
    responses(
        (status = 200, description = "Recent logs", body = LogsResponse),
    )
)]
pub async fn list_logs(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Response {
    let limit = match query.limit {
        Some(0) | None => DEFAULT_LOG_LIMIT,
        Some(limit) => limit.min(state.config.log_buffer_capacity),
    };
    let logs = state
        .logs
        .recent_logs(limit, query.service.as_deref(), query.level.as_deref());

    if query.format.as_deref() == Some("text") {
        let text: String = logs
            .iter()
            .map(|l| {
                format!(
                    "{} [{}] {}: {}\n",
                    l.timestamp.to_rfc3339(),
                    l.level,
                    l.service,
                    l.message
                )
            })
            .collect();
        return ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response();
    }

    let count = logs.len();
    Json(LogsResponse { logs, count }).into_response()
}

/// Aggregate counters over the retained logs
#[utoipa::path(
    get,
    path = "/api/v1/logs/stats",
    tag = "logs",
    responses(
        (status = 200, description = "Log statistics", body = LogStats),
    )
)]
pub async fn log_stats(State(state): State<AppState>) -> Json<LogStats> {
    Json(state.logs.stats())
}
