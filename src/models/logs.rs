use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::ConfigMap;

/// One synthetic application log line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub service: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Request latency in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[schema(value_type = Object)]
    pub labels: BTreeMap<String, String>,
}

/// What one generation batch produced
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct GenerationResult {
    pub generated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_log: Option<LogEntry>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub log_count: usize,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub config: Option<ConfigMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateResponse {
    pub status: String,
    pub generated: usize,
    pub metrics_count: usize,
    pub sample_log: Option<LogEntry>,
}

/// Aggregate counters over the retained log buffer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct LogStats {
    pub total_logs: usize,
    #[schema(value_type = Object)]
    pub levels: BTreeMap<String, usize>,
    #[schema(value_type = Object)]
    pub services: BTreeMap<String, usize>,
    #[schema(value_type = Object)]
    pub statuses: BTreeMap<u16, usize>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogQuery {
    pub limit: Option<usize>,
    pub service: Option<String>,
    pub level: Option<String>,
    /// `text` for plain lines, JSON otherwise
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MetricsQuery {
    /// `json` or `prometheus` (default)
    pub format: Option<String>,
}
