use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Opaque key→value configuration attached to scenarios, schedules and steps
pub type ConfigMap = serde_json::Map<String, Value>;

/// Catalog entry for a scenario that can be started
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScenarioType {
    #[serde(rename = "type")]
    pub scenario_type: String,
    pub name: String,
    pub description: String,
    pub default_log_count: u32,
    #[schema(value_type = Object)]
    pub labels: BTreeMap<String, String>,
    #[schema(value_type = Object)]
    pub parameters: ConfigMap,
}

/// Fully resolved configuration of a running instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScenarioConfig {
    pub name: String,
    pub description: String,
    pub log_count: u32,
    #[schema(value_type = Object)]
    pub labels: BTreeMap<String, String>,
    #[schema(value_type = Object)]
    pub parameters: ConfigMap,
    /// Run for this long, then finish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    /// Generate one batch per interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    /// Hold generation until this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Periodic and timed generation stops here even if the duration has not elapsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl ScenarioConfig {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds.filter(|s| *s > 0).map(Duration::from_secs)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_seconds.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

/// How an instance ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InstanceOutcome {
    Completed,
    Stopped,
}

/// A run of a scenario type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScenarioInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub scenario_type: String,
    pub config: ScenarioConfig,
    pub active: bool,
    pub started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<InstanceOutcome>,
    /// Logs produced so far
    #[serde(default)]
    pub generated: u64,
}

/// Snapshot returned by `GET /scenarios/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScenarioListing {
    pub available: Vec<ScenarioType>,
    pub active: Vec<ScenarioInstance>,
    /// Recently finished instances, newest first
    pub recent: Vec<ScenarioInstance>,
    /// Predefined chains keyed by chain id
    #[schema(value_type = Object)]
    pub chains: BTreeMap<String, super::Chain>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StartScenarioRequest {
    #[serde(rename = "type")]
    pub scenario_type: String,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub config: Option<ConfigMap>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct StopScenarioRequest {
    #[serde(rename = "type")]
    pub scenario_type: String,
}

/// Longest accepted duration or interval (ten years)
pub const MAX_TIMING_SECONDS: u64 = 10 * 365 * 24 * 3600;

/// Step or scenario duration bound from `duration_seconds|minutes|hours`
pub fn duration_from_config(config: &ConfigMap) -> Option<Duration> {
    seconds_from_config(
        config,
        &[
            ("duration_seconds", 1),
            ("duration_minutes", 60),
            ("duration_hours", 3600),
        ],
    )
    .map(Duration::from_secs)
}

/// Repeat interval from `interval_seconds|minutes`
pub fn interval_from_config(config: &ConfigMap) -> Option<Duration> {
    seconds_from_config(config, &[("interval_seconds", 1), ("interval_minutes", 60)])
        .map(Duration::from_secs)
}

fn seconds_from_config(config: &ConfigMap, keys: &[(&str, u64)]) -> Option<u64> {
    keys.iter().find_map(|(key, factor)| {
        let value = config.get(*key)?.as_f64()?;
        if value > 0.0 {
            Some((value * *factor as f64).round() as u64)
        } else {
            None
        }
    })
}

/// Shallow merge: keys in `overrides` replace keys in `base`
pub fn merge_config(base: &ConfigMap, overrides: &ConfigMap) -> ConfigMap {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
