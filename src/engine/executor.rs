//! Runs chains step by step
//!
//! Each execution is driven by its own task. Delays and duration bounds are
//! raced against the execution's [`CancellationToken`], so stopping an
//! execution interrupts whatever step it is suspended in. A duration bound
//! also ends early when the step's scenario instance stops on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::increment_counter;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::chains::ChainStore;
use super::runner::ScenarioRunner;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::events::{emit, Event, EventSender};
use crate::models::{
    duration_from_config, merge_config, Chain, ChainExecution, ExecutionStatus, StepStatus,
};

struct InFlight {
    execution_id: String,
    cancel: CancellationToken,
}

enum StepsOutcome {
    Completed,
    Failed { step_index: usize, error: String },
    Cancelled,
}

#[derive(Clone)]
pub struct ChainExecutor {
    chains: Arc<ChainStore>,
    runner: ScenarioRunner,
    clock: Arc<dyn Clock>,
    events: EventSender,
    /// At most one execution per chain id
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl ChainExecutor {
    pub fn new(
        chains: Arc<ChainStore>,
        runner: ScenarioRunner,
        clock: Arc<dyn Clock>,
        events: EventSender,
    ) -> Self {
        Self {
            chains,
            runner,
            clock,
            events,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a new execution of `chain_id`. The returned execution is
    /// already `running`.
    #[instrument(skip(self))]
    pub async fn start(
        &self,
        chain_id: &str,
        triggered_by: Option<String>,
    ) -> AppResult<ChainExecution> {
        let mut in_flight = self.in_flight.lock().await;
        let chain = self.chains.get(chain_id).await?;
        if in_flight.contains_key(chain_id) {
            return Err(AppError::Conflict(format!(
                "Chain {} is already running",
                chain_id
            )));
        }

        let mut execution =
            ChainExecution::new(Uuid::new_v4().to_string(), &chain, self.clock.now());
        execution.triggered_by = triggered_by;
        execution.status = ExecutionStatus::Running;
        self.chains.insert_execution(execution.clone()).await;

        let cancel = CancellationToken::new();
        in_flight.insert(
            chain.id.clone(),
            InFlight {
                execution_id: execution.id.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(in_flight);

        info!(execution_id = %execution.id, steps = chain.steps.len(), "Chain execution started");
        emit(
            &self.events,
            Event::ChainStarted {
                execution_id: execution.id.clone(),
                chain_id: chain.id.clone(),
            },
        );

        let executor = self.clone();
        let execution_id = execution.id.clone();
        tokio::spawn(async move {
            executor.drive(chain, execution_id, cancel).await;
        });

        Ok(execution)
    }

    /// Stop an in-flight execution; it ends as `stopped`
    #[instrument(skip(self))]
    pub async fn stop(&self, execution_id: &str) -> AppResult<ChainExecution> {
        let mut in_flight = self.in_flight.lock().await;
        let chain_id = in_flight
            .iter()
            .find(|(_, f)| f.execution_id == execution_id)
            .map(|(chain_id, _)| chain_id.clone())
            .ok_or_else(|| {
                AppError::NotFound(format!("Execution {} is not running", execution_id))
            })?;

        if let Some(flight) = in_flight.remove(&chain_id) {
            flight.cancel.cancel();
        }
        let execution = self
            .finalize(execution_id, ExecutionStatus::Stopped, None)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Execution {} not found", execution_id)))?;
        drop(in_flight);

        info!(chain_id = %chain_id, "Chain execution stopped");
        Ok(execution)
    }

    /// Stop whatever execution of `chain_id` is in flight
    pub async fn stop_chain(&self, chain_id: &str) -> AppResult<ChainExecution> {
        let execution_id = self
            .in_flight
            .lock()
            .await
            .get(chain_id)
            .map(|f| f.execution_id.clone())
            .ok_or_else(|| AppError::NotFound(format!("Chain {} is not running", chain_id)))?;
        self.stop(&execution_id).await
    }

    pub async fn is_running(&self, chain_id: &str) -> bool {
        self.in_flight.lock().await.contains_key(chain_id)
    }

    /// Delete a chain definition; refused while one of its executions runs
    pub async fn delete_chain(&self, chain_id: &str) -> AppResult<Chain> {
        let in_flight = self.in_flight.lock().await;
        if in_flight.contains_key(chain_id) {
            return Err(AppError::Conflict(format!(
                "Chain {} has an execution in progress",
                chain_id
            )));
        }
        self.chains.remove(chain_id).await
    }

    async fn drive(self, chain: Chain, execution_id: String, cancel: CancellationToken) {
        let outcome = self.run_steps(&chain, &execution_id, &cancel).await;

        let mut in_flight = self.in_flight.lock().await;
        let owns_slot = in_flight
            .get(&chain.id)
            .is_some_and(|f| f.execution_id == execution_id);
        if !owns_slot {
            // stopped while finishing up
            return;
        }

        match outcome {
            StepsOutcome::Completed => {
                self.finalize(&execution_id, ExecutionStatus::Completed, None)
                    .await;
            }
            StepsOutcome::Failed { step_index, error } => {
                warn!(%execution_id, step_index, %error, "Chain step failed");
                self.finalize(
                    &execution_id,
                    ExecutionStatus::Failed,
                    Some((step_index, error)),
                )
                .await;
            }
            StepsOutcome::Cancelled => {}
        }
        in_flight.remove(&chain.id);
    }

    async fn run_steps(
        &self,
        chain: &Chain,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> StepsOutcome {
        for (index, step) in chain.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return StepsOutcome::Cancelled;
            }

            let now = self.clock.now();
            let marked = self
                .update_live(execution_id, |e| {
                    e.current_step_index = index;
                    e.steps[index].status = StepStatus::Running;
                    e.steps[index].started = Some(now);
                })
                .await;
            if !marked {
                return StepsOutcome::Cancelled;
            }
            self.step_event(execution_id, index, StepStatus::Running);

            if step.delay_before > 0 {
                debug!(%execution_id, index, delay = step.delay_before, "Waiting before step");
                tokio::select! {
                    _ = cancel.cancelled() => return StepsOutcome::Cancelled,
                    _ = tokio::time::sleep(Duration::from_secs(step.delay_before)) => {}
                }
            }

            let config = merge_config(&chain.defaults, &step.config);
            let started = self
                .runner
                .start_tracked(&step.scenario_type, Some(&config))
                .await;
            let (instance, handle) = match started {
                Ok(started) => started,
                Err(e) => {
                    return StepsOutcome::Failed {
                        step_index: index,
                        error: e.to_string(),
                    }
                }
            };
            let instance_id = instance.id.clone();
            self.update_live(execution_id, |e| {
                e.steps[index].instance_id = Some(instance_id);
            })
            .await;

            if let Some(bound) = duration_from_config(&config) {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.runner.stop_instance(&step.scenario_type, &instance.id).await;
                        return StepsOutcome::Cancelled;
                    }
                    _ = handle.ended() => {
                        debug!(%execution_id, index, "Step scenario ended before its bound");
                    }
                    _ = tokio::time::sleep(bound) => {}
                }
                self.runner
                    .stop_instance(&step.scenario_type, &instance.id)
                    .await;
            }

            let now = self.clock.now();
            let marked = self
                .update_live(execution_id, |e| {
                    e.steps[index].status = StepStatus::Completed;
                    e.steps[index].finished = Some(now);
                })
                .await;
            if !marked {
                return StepsOutcome::Cancelled;
            }
            self.step_event(execution_id, index, StepStatus::Completed);
        }

        StepsOutcome::Completed
    }

    /// Apply a step update unless the execution already reached a terminal
    /// status. Returns whether it was applied.
    async fn update_live<F>(&self, execution_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut ChainExecution),
    {
        let mut applied = false;
        self.chains
            .update_execution(execution_id, |e| {
                if !e.status.is_terminal() {
                    f(e);
                    applied = true;
                }
            })
            .await;
        applied
    }

    /// Move an execution into a terminal status. Returns `None` if the
    /// execution is unknown; an execution that is already terminal is
    /// returned unchanged.
    async fn finalize(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        failure: Option<(usize, String)>,
    ) -> Option<ChainExecution> {
        let now = self.clock.now();
        let mut applied = false;
        let execution = self
            .chains
            .update_execution(execution_id, |e| {
                if !e.status.can_transition_to(status) {
                    return;
                }
                applied = true;
                e.status = status;
                e.finished = Some(now);

                if status == ExecutionStatus::Completed {
                    e.current_step_index = e.steps.len();
                }
                if let Some((index, error)) = failure {
                    e.failed_step_index = Some(index);
                    if let Some(step) = e.steps.get_mut(index) {
                        step.status = StepStatus::Failed;
                        step.finished = Some(now);
                        step.error = Some(error.clone());
                    }
                    e.error = Some(error);
                }
                for step in e.steps.iter_mut() {
                    match step.status {
                        StepStatus::Pending => step.status = StepStatus::Skipped,
                        StepStatus::Running => {
                            step.status = StepStatus::Skipped;
                            step.finished = Some(now);
                        }
                        _ => {}
                    }
                }
            })
            .await?;

        if applied {
            increment_counter!("logsim_chain_executions_total", "status" => status.to_string());
            info!(%execution_id, %status, "Chain execution finished");
            emit(
                &self.events,
                Event::ChainFinished {
                    execution_id: execution.id.clone(),
                    chain_id: execution.chain_id.clone(),
                    status: status.to_string(),
                },
            );
        }
        Some(execution)
    }

    fn step_event(&self, execution_id: &str, step_index: usize, status: StepStatus) {
        emit(
            &self.events,
            Event::ChainStep {
                execution_id: execution_id.to_string(),
                step_index,
                status: status.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::engine::registry::{predefined_chains, ScenarioRegistry};
    use crate::generator::LogGenerator;
    use crate::models::{ChainStep, CreateChainRequest, GenerationResult, ScenarioConfig};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    /// Never finishes a batch, so instances stay active until stopped
    struct StallingGenerator;

    #[async_trait]
    impl LogGenerator for StallingGenerator {
        async fn run(&self, _: &str, _: &ScenarioConfig) -> GenerationResult {
            std::future::pending::<()>().await;
            GenerationResult::default()
        }
    }

    struct Fixture {
        executor: ChainExecutor,
        chains: Arc<ChainStore>,
        runner: ScenarioRunner,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ScenarioRegistry::builtin());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let events = crate::events::channel();
        let runner = ScenarioRunner::new(
            registry.clone(),
            Arc::new(StallingGenerator),
            clock.clone(),
            events.clone(),
            10,
        );
        let chains = Arc::new(ChainStore::new(
            registry,
            clock.clone(),
            10,
            predefined_chains(Utc::now()),
        ));
        Fixture {
            executor: ChainExecutor::new(chains.clone(), runner.clone(), clock, events),
            chains,
            runner,
        }
    }

    fn step(scenario_type: &str, delay_before: u64, config: serde_json::Value) -> ChainStep {
        ChainStep {
            name: scenario_type.to_string(),
            scenario_type: scenario_type.to_string(),
            delay_before,
            config: config.as_object().cloned().unwrap_or_default(),
        }
    }

    async fn create(chains: &ChainStore, steps: Vec<ChainStep>) -> Chain {
        chains
            .create(CreateChainRequest {
                name: "drill".to_string(),
                description: String::new(),
                defaults: Default::default(),
                steps,
            })
            .await
            .unwrap()
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_run_in_order_with_delay() {
        let f = fixture();
        let chain = create(
            &f.chains,
            vec![
                step("load_test", 0, json!({"duration_seconds": 1})),
                step("error_spike", 5, json!({})),
            ],
        )
        .await;

        let execution = f.executor.start(&chain.id, None).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        settle().await;
        assert!(f.runner.is_active("load_test").await);
        assert!(!f.runner.is_active("error_spike").await);

        // first step ends after 1s, second starts 5s later
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert!(!f.runner.is_active("load_test").await);
        assert!(!f.runner.is_active("error_spike").await);
        let midway = f.chains.execution(&execution.id).await.unwrap();
        assert_eq!(midway.status, ExecutionStatus::Running);
        assert_eq!(midway.current_step_index, 1);
        assert_eq!(midway.steps[0].status, StepStatus::Completed);
        assert_eq!(midway.steps[1].status, StepStatus::Running);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(f.runner.is_active("error_spike").await);

        settle().await;
        let done = f.chains.execution(&execution.id).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.current_step_index, 2);
        assert!(done.steps.iter().all(|s| s.status == StepStatus::Completed));
        assert!(!f.executor.is_running(&chain.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_conflicts_while_running() {
        let f = fixture();
        let chain = create(&f.chains, vec![step("load_test", 30, json!({}))]).await;

        f.executor.start(&chain.id, None).await.unwrap();
        assert!(matches!(
            f.executor.start(&chain.id, None).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            f.executor.start("missing", None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_delay() {
        let f = fixture();
        let chain = create(&f.chains, vec![step("load_test", 3600, json!({}))]).await;
        let execution = f.executor.start(&chain.id, None).await.unwrap();
        settle().await;

        let stopped = f.executor.stop(&execution.id).await.unwrap();
        assert_eq!(stopped.status, ExecutionStatus::Stopped);
        assert!(stopped.finished.is_some());
        assert!(!f.executor.is_running(&chain.id).await);
        assert!(!f.runner.is_active("load_test").await);

        // terminal status is immutable
        settle().await;
        let after = f.chains.execution(&execution.id).await.unwrap();
        assert_eq!(after.status, ExecutionStatus::Stopped);
        assert!(matches!(
            f.executor.stop(&execution.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_propagates_to_bounded_step() {
        let f = fixture();
        let chain = create(
            &f.chains,
            vec![step("slow_responses", 0, json!({"duration_seconds": 600}))],
        )
        .await;
        let execution = f.executor.start(&chain.id, None).await.unwrap();
        settle().await;
        assert!(f.runner.is_active("slow_responses").await);

        f.executor.stop_chain(&chain.id).await.unwrap();
        settle().await;
        assert!(!f.runner.is_active("slow_responses").await);
        let after = f.chains.execution(&execution.id).await.unwrap();
        assert_eq!(after.steps[0].status, StepStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_step_scenario_advances_chain() {
        let f = fixture();
        let chain = create(
            &f.chains,
            vec![
                step("slow_responses", 0, json!({"duration_seconds": 600})),
                step("error_spike", 0, json!({})),
            ],
        )
        .await;
        let execution = f.executor.start(&chain.id, None).await.unwrap();
        settle().await;
        assert!(f.runner.is_active("slow_responses").await);

        f.runner.stop("slow_responses").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        settle().await;

        assert!(f.runner.is_active("error_spike").await);
        let done = f.chains.execution(&execution.id).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.steps[0].status, StepStatus::Completed);
        assert_eq!(done.steps[1].status, StepStatus::Completed);
        assert!(!f.executor.is_running(&chain.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_execution_steps_are_frozen() {
        let f = fixture();
        let chain = create(&f.chains, vec![step("load_test", 3600, json!({}))]).await;
        let execution = f.executor.start(&chain.id, None).await.unwrap();
        settle().await;
        f.executor.stop(&execution.id).await.unwrap();

        let applied = f
            .executor
            .update_live(&execution.id, |e| {
                e.steps[0].status = StepStatus::Completed;
            })
            .await;
        assert!(!applied);
        let after = f.chains.execution(&execution.id).await.unwrap();
        assert_eq!(after.status, ExecutionStatus::Stopped);
        assert_eq!(after.steps[0].status, StepStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_step_records_index() {
        let f = fixture();
        f.runner.start("error_spike", None).await.unwrap();
        let chain = create(
            &f.chains,
            vec![
                step("load_test", 0, json!({"duration_seconds": 1})),
                step("error_spike", 0, json!({})),
            ],
        )
        .await;

        let execution = f.executor.start(&chain.id, None).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;

        let failed = f.chains.execution(&execution.id).await.unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.failed_step_index, Some(1));
        assert!(failed.error.is_some());
        assert_eq!(failed.steps[1].status, StepStatus::Failed);
        assert!(!f.executor.is_running(&chain.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_refused_while_running() {
        let f = fixture();
        let chain = create(
            &f.chains,
            vec![step("load_test", 0, json!({"duration_seconds": 10}))],
        )
        .await;
        let execution = f.executor.start(&chain.id, None).await.unwrap();

        assert!(matches!(
            f.executor.delete_chain(&chain.id).await,
            Err(AppError::Conflict(_))
        ));

        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(
            f.chains.execution(&execution.id).await.unwrap().status,
            ExecutionStatus::Completed
        );
        assert!(f.executor.delete_chain(&chain.id).await.is_ok());
        assert!(f.chains.get(&chain.id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_predefined_chain_runs_all_steps() {
        let f = fixture();
        let execution = f.executor.start("black_friday_rush", None).await.unwrap();
        settle().await;

        let done = f.chains.execution(&execution.id).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert!(f.runner.is_active("load_test").await);
        assert!(f.runner.is_active("error_spike").await);
    }
}
