use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ConfigMap;
use crate::cron::{CronExpression, CronParseError};

/// Cron trigger state shared by scenario and chain schedules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct CronTiming {
    #[schema(example = "0 2 * * *")]
    pub cron_expr: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    /// Null iff disabled
    pub next_run: Option<DateTime<Utc>>,
}

impl CronTiming {
    pub fn new(
        cron_expr: String,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            cron_expr,
            enabled: false,
            start_date,
            end_date,
            last_run: None,
            next_run: None,
        }
    }

    /// Enable and compute the first fire strictly after `now` that falls
    /// inside the window. Leaves the trigger disabled and returns false when
    /// the window has no fire left.
    pub fn arm(&mut self, now: DateTime<Utc>) -> Result<bool, CronParseError> {
        let cron = CronExpression::parse(&self.cron_expr)?;
        let base = match self.start_date {
            // fires are whole minutes; this keeps a fire exactly at start_date
            Some(start) if start > now => start - Duration::nanoseconds(1),
            _ => now,
        };
        match cron.next_after(base) {
            Some(next) if self.end_date.map_or(true, |end| next <= end) => {
                self.enabled = true;
                self.next_run = Some(next);
                Ok(true)
            }
            _ => {
                self.disarm();
                Ok(false)
            }
        }
    }

    pub fn disarm(&mut self) {
        self.enabled = false;
        self.next_run = None;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run.is_some_and(|next| next <= now)
    }

    /// The window is valid when it is open-ended or ends no earlier than it starts
    pub fn window_is_valid(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => end >= start,
            _ => true,
        }
    }
}

/// Cron-triggered scenario start
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub scenario_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: ConfigMap,
    #[serde(flatten)]
    pub timing: CronTiming,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cron-triggered chain execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ChainSchedule {
    pub id: String,
    pub name: String,
    pub chain_id: String,
    #[serde(flatten)]
    pub timing: CronTiming,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub scenario_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: ConfigMap,
    pub cron_expr: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateScheduleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cron_expr: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub config: Option<ConfigMap>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateChainScheduleRequest {
    pub name: String,
    /// `chain_name` is accepted for older dashboards
    #[serde(alias = "chain_name")]
    pub chain_id: String,
    pub cron_expr: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateChainScheduleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "chain_name")]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub cron_expr: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FireStatus {
    Completed,
    Failed,
}

/// Outcome of one scheduler dispatch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct FireRecord {
    pub id: String,
    pub schedule_id: String,
    /// Scenario type or chain id that was dispatched
    pub target: String,
    pub status: FireStatus,
    pub fired_at: DateTime<Utc>,
    /// Scenario instance or chain execution created by the fire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CronExample {
    #[schema(example = "0 2 * * *")]
    pub expression: String,
    pub description: String,
}
