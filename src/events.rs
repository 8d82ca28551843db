//! Engine lifecycle events broadcast to WebSocket subscribers

use serde::Serialize;
use tokio::sync::broadcast;

pub type EventSender = broadcast::Sender<Event>;

/// Channel capacity; slow subscribers see `Lagged` and skip ahead
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub fn channel() -> EventSender {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    #[serde(rename = "scenario:started")]
    ScenarioStarted { instance_id: String, scenario_type: String },
    #[serde(rename = "scenario:stopped")]
    ScenarioStopped { instance_id: String, scenario_type: String },
    #[serde(rename = "scenario:finished")]
    ScenarioFinished { instance_id: String, scenario_type: String, generated: u64 },
    #[serde(rename = "chain:started")]
    ChainStarted { execution_id: String, chain_id: String },
    #[serde(rename = "chain:step")]
    ChainStep { execution_id: String, step_index: usize, status: String },
    #[serde(rename = "chain:finished")]
    ChainFinished { execution_id: String, chain_id: String, status: String },
    #[serde(rename = "schedule:created")]
    ScheduleCreated { id: String },
    #[serde(rename = "schedule:updated")]
    ScheduleUpdated { id: String },
    #[serde(rename = "schedule:deleted")]
    ScheduleDeleted { id: String },
    #[serde(rename = "schedule:fired")]
    ScheduleFired { id: String, target: String, status: String },
}

/// Send without caring whether anyone is listening
pub fn emit(tx: &EventSender, event: Event) {
    let _ = tx.send(event);
}
