use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ConfigMap;

/// One step of a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ChainStep {
    #[serde(default)]
    pub name: String,
    pub scenario_type: String,
    /// Seconds to wait before starting this step
    #[serde(default)]
    pub delay_before: u64,
    /// Step-level overrides; `duration_*` keys bound how long the step runs
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: ConfigMap,
}

/// An ordered list of scenario steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Chain {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Chain-level config merged under every step's `config`
    #[serde(default)]
    #[schema(value_type = Object)]
    pub defaults: ConfigMap,
    pub steps: Vec<ChainStep>,
    /// Seeded at startup rather than created through the API
    #[serde(default)]
    pub predefined: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateChainRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub defaults: ConfigMap,
    pub steps: Vec<ChainStep>,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }

    /// pending → running → {completed, failed, stopped}; terminal states never move
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (ExecutionStatus::Pending, ExecutionStatus::Running) => true,
            (ExecutionStatus::Pending, s) | (ExecutionStatus::Running, s) => s.is_terminal(),
            _ => false,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Progress of one step inside an execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StepRecord {
    pub step_index: usize,
    pub name: String,
    pub scenario_type: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    /// Scenario instance started by this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single run of a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ChainExecution {
    pub id: String,
    pub chain_id: String,
    pub status: ExecutionStatus,
    pub current_step_index: usize,
    pub started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Chain schedule that dispatched this run, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    pub steps: Vec<StepRecord>,
}

impl ChainExecution {
    pub fn new(id: String, chain: &Chain, started: DateTime<Utc>) -> Self {
        let steps = chain
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepRecord {
                step_index: i,
                name: step.name.clone(),
                scenario_type: step.scenario_type.clone(),
                status: StepStatus::Pending,
                started: None,
                finished: None,
                instance_id: None,
                error: None,
            })
            .collect();

        Self {
            id,
            chain_id: chain.id.clone(),
            status: ExecutionStatus::Pending,
            current_step_index: 0,
            started,
            finished: None,
            failed_step_index: None,
            error: None,
            triggered_by: None,
            steps,
        }
    }
}
