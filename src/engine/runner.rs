//! Scenario instance lifecycle
//!
//! At most one instance per scenario type is active. Each instance runs on
//! its own task; stopping it cancels that task through a
//! [`CancellationToken`], and natural completion clears `active` itself.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::increment_counter;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::registry::ScenarioRegistry;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::events::{emit, Event, EventSender};
use crate::generator::LogGenerator;
use crate::models::{
    duration_from_config, interval_from_config, ConfigMap, InstanceOutcome, ScenarioConfig,
    ScenarioInstance, ScenarioType, MAX_TIMING_SECONDS,
};

/// Batch cadence for duration-bounded scenarios without an explicit interval
const TIMED_BATCH_PERIOD: Duration = Duration::from_secs(10);

struct ActiveScenario {
    instance: ScenarioInstance,
    cancel: CancellationToken,
}

#[derive(Default)]
struct RunnerState {
    active: BTreeMap<String, ActiveScenario>,
    recent: VecDeque<ScenarioInstance>,
}

/// Resolves once the instance it was issued for is no longer active,
/// whether it was stopped or finished on its own
pub struct InstanceHandle {
    ended: CancellationToken,
}

impl InstanceHandle {
    pub async fn ended(&self) {
        self.ended.cancelled().await
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_cancelled()
    }
}

/// Read-only view of the runner
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSnapshot {
    pub available: Vec<ScenarioType>,
    pub active: Vec<ScenarioInstance>,
    pub recent: Vec<ScenarioInstance>,
}

#[derive(Clone)]
pub struct ScenarioRunner {
    registry: Arc<ScenarioRegistry>,
    generator: Arc<dyn LogGenerator>,
    clock: Arc<dyn Clock>,
    events: EventSender,
    history_limit: usize,
    state: Arc<RwLock<RunnerState>>,
}

impl ScenarioRunner {
    pub fn new(
        registry: Arc<ScenarioRegistry>,
        generator: Arc<dyn LogGenerator>,
        clock: Arc<dyn Clock>,
        events: EventSender,
        history_limit: usize,
    ) -> Self {
        Self {
            registry,
            generator,
            clock,
            events,
            history_limit,
            state: Arc::new(RwLock::new(RunnerState::default())),
        }
    }

    /// Start an instance of `scenario_type` with optional overrides.
    ///
    /// Fails with `Conflict` if the type already has an active instance.
    pub async fn start(
        &self,
        scenario_type: &str,
        overrides: Option<&ConfigMap>,
    ) -> AppResult<ScenarioInstance> {
        self.start_tracked(scenario_type, overrides)
            .await
            .map(|(instance, _)| instance)
    }

    /// Like [`start`](Self::start), also returning a handle that resolves
    /// when the instance ends
    #[instrument(skip(self, overrides))]
    pub async fn start_tracked(
        &self,
        scenario_type: &str,
        overrides: Option<&ConfigMap>,
    ) -> AppResult<(ScenarioInstance, InstanceHandle)> {
        let template = self.registry.get(scenario_type).ok_or_else(|| {
            AppError::Validation(format!("Unknown scenario type: {}", scenario_type))
        })?;
        let config = resolve_config(template, overrides, self.clock.now())?;

        let mut state = self.state.write().await;
        if state.active.contains_key(scenario_type) {
            return Err(AppError::Conflict(format!(
                "Scenario {} is already active",
                scenario_type
            )));
        }

        let instance = ScenarioInstance {
            id: Uuid::new_v4().to_string(),
            scenario_type: scenario_type.to_string(),
            config,
            active: true,
            started: self.clock.now(),
            finished: None,
            outcome: None,
            generated: 0,
        };
        let cancel = CancellationToken::new();
        state.active.insert(
            scenario_type.to_string(),
            ActiveScenario {
                instance: instance.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(state);

        info!(
            instance_id = %instance.id,
            log_count = instance.config.log_count,
            duration_seconds = ?instance.config.duration_seconds,
            interval_seconds = ?instance.config.interval_seconds,
            start_date = ?instance.config.start_date,
            end_date = ?instance.config.end_date,
            "Scenario started"
        );
        increment_counter!(
            "logsim_scenarios_started_total",
            "scenario" => scenario_type.to_string()
        );
        emit(
            &self.events,
            Event::ScenarioStarted {
                instance_id: instance.id.clone(),
                scenario_type: instance.scenario_type.clone(),
            },
        );

        let handle = InstanceHandle {
            ended: cancel.clone(),
        };
        let runner = self.clone();
        let task_instance = instance.clone();
        tokio::spawn(async move {
            runner.drive(task_instance, cancel).await;
        });

        Ok((instance, handle))
    }

    /// Stop the active instance of `scenario_type`
    #[instrument(skip(self))]
    pub async fn stop(&self, scenario_type: &str) -> AppResult<ScenarioInstance> {
        let mut state = self.state.write().await;
        let entry = state.active.remove(scenario_type).ok_or_else(|| {
            AppError::NotFound(format!("Scenario {} is not active", scenario_type))
        })?;
        let instance = self.retire(&mut state, entry, InstanceOutcome::Stopped);
        drop(state);

        info!(instance_id = %instance.id, "Scenario stopped");
        emit(
            &self.events,
            Event::ScenarioStopped {
                instance_id: instance.id.clone(),
                scenario_type: instance.scenario_type.clone(),
            },
        );
        Ok(instance)
    }

    /// Stop `scenario_type` only if its active instance is `instance_id`.
    /// Returns false when that instance already ended.
    pub async fn stop_instance(&self, scenario_type: &str, instance_id: &str) -> bool {
        let mut state = self.state.write().await;
        let matches = state
            .active
            .get(scenario_type)
            .is_some_and(|a| a.instance.id == instance_id);
        if !matches {
            return false;
        }
        if let Some(entry) = state.active.remove(scenario_type) {
            let instance = self.retire(&mut state, entry, InstanceOutcome::Stopped);
            drop(state);
            debug!(instance_id = %instance.id, "Scenario instance stopped");
            emit(
                &self.events,
                Event::ScenarioStopped {
                    instance_id: instance.id,
                    scenario_type: instance.scenario_type,
                },
            );
        }
        true
    }

    pub async fn is_active(&self, scenario_type: &str) -> bool {
        self.state.read().await.active.contains_key(scenario_type)
    }

    pub async fn active_instance(&self, scenario_type: &str) -> Option<ScenarioInstance> {
        self.state
            .read()
            .await
            .active
            .get(scenario_type)
            .map(|a| a.instance.clone())
    }

    pub async fn list(&self) -> RunnerSnapshot {
        let state = self.state.read().await;
        RunnerSnapshot {
            available: self.registry.list(),
            active: state.active.values().map(|a| a.instance.clone()).collect(),
            recent: state.recent.iter().cloned().collect(),
        }
    }

    fn retire(
        &self,
        state: &mut RunnerState,
        entry: ActiveScenario,
        outcome: InstanceOutcome,
    ) -> ScenarioInstance {
        entry.cancel.cancel();
        let mut instance = entry.instance;
        instance.active = false;
        instance.finished = Some(self.clock.now());
        instance.outcome = Some(outcome);

        state.recent.push_front(instance.clone());
        state.recent.truncate(self.history_limit);
        instance
    }

    async fn drive(self, instance: ScenarioInstance, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(instance_id = %instance.id, "Scenario task cancelled");
            }
            _ = self.execute(&instance) => {
                self.complete(&instance).await;
            }
        }
    }

    /// Time left until `instant`, zero once it has passed
    fn until(&self, instant: DateTime<Utc>) -> Duration {
        (instant - self.clock.now()).to_std().unwrap_or(Duration::ZERO)
    }

    async fn execute(&self, instance: &ScenarioInstance) {
        let config = &instance.config;
        if let Some(start) = config.start_date {
            let wait = self.until(start);
            if !wait.is_zero() {
                debug!(instance_id = %instance.id, %start, "Waiting for start_date");
                tokio::time::sleep(wait).await;
            }
        }

        // end_date caps the duration; measured after the start wait
        let until_end = config.end_date.map(|end| self.until(end));
        let bound = match (config.duration(), until_end) {
            (Some(duration), Some(end)) => Some(duration.min(end)),
            (duration, end) => duration.or(end),
        };

        match (config.interval(), config.duration(), bound) {
            (Some(every), _, bound) => self.execute_periodic(instance, every, bound).await,
            (None, Some(_), Some(bound)) => self.execute_timed(instance, bound).await,
            _ => self.execute_batch(instance, config).await,
        }
    }

    /// One batch of `log_count` per interval until the bound elapses (or forever)
    async fn execute_periodic(
        &self,
        instance: &ScenarioInstance,
        every: Duration,
        bound: Option<Duration>,
    ) {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let batches = async {
            loop {
                ticker.tick().await;
                self.execute_batch(instance, &instance.config).await;
            }
        };

        match bound {
            Some(bound) => {
                let _ = timeout(bound, batches).await;
            }
            None => batches.await,
        }
    }

    /// Spread `log_count` over the bound in fixed-period batches
    async fn execute_timed(&self, instance: &ScenarioInstance, bound: Duration) {
        let period = TIMED_BATCH_PERIOD.min(bound).max(Duration::from_millis(1));
        let batches = (bound.as_secs_f64() / period.as_secs_f64()).floor().max(1.0) as u32;
        let mut batch_config = instance.config.clone();
        batch_config.log_count = instance.config.log_count.div_ceil(batches).max(1);

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let _ = timeout(bound, async {
            loop {
                ticker.tick().await;
                self.execute_batch(instance, &batch_config).await;
            }
        })
        .await;
    }

    async fn execute_batch(&self, instance: &ScenarioInstance, config: &ScenarioConfig) {
        let result = self.generator.run(&instance.scenario_type, config).await;
        let mut state = self.state.write().await;
        if let Some(active) = state.active.get_mut(&instance.scenario_type) {
            if active.instance.id == instance.id {
                active.instance.generated += result.generated as u64;
            }
        }
    }

    /// Natural completion; a no-op if the instance was stopped meanwhile
    async fn complete(&self, instance: &ScenarioInstance) {
        let mut state = self.state.write().await;
        let still_current = state
            .active
            .get(&instance.scenario_type)
            .is_some_and(|a| a.instance.id == instance.id);
        if !still_current {
            return;
        }
        let Some(entry) = state.active.remove(&instance.scenario_type) else {
            return;
        };
        let finished = self.retire(&mut state, entry, InstanceOutcome::Completed);
        drop(state);

        info!(
            instance_id = %finished.id,
            scenario = %finished.scenario_type,
            generated = finished.generated,
            "Scenario finished"
        );
        emit(
            &self.events,
            Event::ScenarioFinished {
                instance_id: finished.id,
                scenario_type: finished.scenario_type,
                generated: finished.generated,
            },
        );
    }
}

/// Registry defaults with request overrides applied
fn resolve_config(
    template: &ScenarioType,
    overrides: Option<&ConfigMap>,
    now: DateTime<Utc>,
) -> AppResult<ScenarioConfig> {
    let mut config = ScenarioConfig {
        name: template.name.clone(),
        description: template.description.clone(),
        log_count: template.default_log_count,
        labels: template.labels.clone(),
        parameters: template.parameters.clone(),
        duration_seconds: duration_from_config(&template.parameters).map(|d| d.as_secs()),
        interval_seconds: interval_from_config(&template.parameters).map(|d| d.as_secs()),
        start_date: None,
        end_date: None,
    };

    let Some(overrides) = overrides else {
        return Ok(config);
    };

    if let Some(value) = overrides.get("log_count") {
        config.log_count = value
            .as_f64()
            .filter(|n| *n >= 1.0 && *n <= u32::MAX as f64)
            .map(|n| n as u32)
            .ok_or_else(|| AppError::validation("log_count must be a positive integer"))?;
    }
    if let Some(Value::Object(labels)) = overrides.get("labels") {
        for (key, value) in labels {
            match value.as_str() {
                Some(s) => {
                    config.labels.insert(key.clone(), s.to_string());
                }
                None => warn!(label = %key, "Ignoring non-string label"),
            }
        }
    }
    if let Some(Value::Object(parameters)) = overrides.get("parameters") {
        for (key, value) in parameters {
            config.parameters.insert(key.clone(), value.clone());
        }
    }
    if let Some(bound) = duration_from_config(overrides) {
        config.duration_seconds = Some(timing_seconds("duration", bound)?);
    }
    if let Some(every) = interval_from_config(overrides) {
        config.interval_seconds = Some(timing_seconds("interval", every)?);
    }

    config.start_date = date_override(overrides, "start_date")?;
    config.end_date = date_override(overrides, "end_date")?;
    if let (Some(start), Some(end)) = (config.start_date, config.end_date) {
        if end < start {
            return Err(AppError::validation("end_date must not be before start_date"));
        }
    }
    if config.end_date.is_some_and(|end| end <= now) {
        return Err(AppError::validation("end_date is in the past"));
    }

    Ok(config)
}

fn timing_seconds(name: &str, value: Duration) -> AppResult<u64> {
    let secs = value.as_secs();
    if secs > MAX_TIMING_SECONDS {
        return Err(AppError::Validation(format!(
            "{} must not exceed {} seconds",
            name, MAX_TIMING_SECONDS
        )));
    }
    Ok(secs)
}

/// RFC 3339 timestamp under `key`, if present
fn date_override(overrides: &ConfigMap, key: &str) -> AppResult<Option<DateTime<Utc>>> {
    match overrides.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| AppError::Validation(format!("{} must be an RFC 3339 timestamp", key))),
        Some(_) => Err(AppError::Validation(format!(
            "{} must be an RFC 3339 timestamp",
            key
        ))),
    }
}
