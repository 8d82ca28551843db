//! Background loop that fires due schedules

use std::sync::Arc;
use std::time::Duration;

use metrics::increment_counter;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::executor::ChainExecutor;
use super::runner::ScenarioRunner;
use super::schedules::ScheduleStore;
use crate::clock::Clock;
use crate::error::AppResult;
use crate::events::{emit, Event, EventSender};
use crate::models::{FireRecord, FireStatus};

/// What one tick dispatched
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub fired: usize,
    pub failed: usize,
}

pub struct Scheduler {
    schedules: Arc<ScheduleStore>,
    runner: ScenarioRunner,
    executor: ChainExecutor,
    clock: Arc<dyn Clock>,
    events: EventSender,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        schedules: Arc<ScheduleStore>,
        runner: ScenarioRunner,
        executor: ChainExecutor,
        clock: Arc<dyn Clock>,
        events: EventSender,
        tick_interval: Duration,
    ) -> Self {
        Self {
            schedules,
            runner,
            executor,
            clock,
            events,
            tick_interval,
        }
    }

    /// Tick until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.tick_interval.as_millis() as u64, "Scheduler started");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.fired > 0 {
                        debug!(fired = report.fired, failed = report.failed, "Scheduler tick");
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }

    /// Fire everything due at the clock's current instant. Dispatch errors
    /// are logged and recorded; they never abort the tick.
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let (scenario_due, chain_due) = self.schedules.claim_due(now).await;
        let mut report = TickReport::default();

        for schedule in scenario_due {
            let result = self
                .runner
                .start(&schedule.scenario_type, Some(&schedule.config))
                .await
                .map(|instance| instance.id);
            let record = self.record(
                &schedule.id,
                &schedule.scenario_type,
                "scenario",
                result,
                &mut report,
            );
            self.schedules.record_scenario_fire(record).await;
        }

        for schedule in chain_due {
            let result = self
                .executor
                .start(&schedule.chain_id, Some(schedule.id.clone()))
                .await
                .map(|execution| execution.id);
            let record =
                self.record(&schedule.id, &schedule.chain_id, "chain", result, &mut report);
            self.schedules.record_chain_fire(record).await;
        }

        report
    }

    fn record(
        &self,
        schedule_id: &str,
        target: &str,
        kind: &'static str,
        result: AppResult<String>,
        report: &mut TickReport,
    ) -> FireRecord {
        report.fired += 1;
        let (status, run_id, error) = match result {
            Ok(run_id) => {
                info!(%schedule_id, %target, %run_id, "Schedule fired");
                (FireStatus::Completed, Some(run_id), None)
            }
            Err(e) => {
                report.failed += 1;
                error!(%schedule_id, %target, error = %e, "Schedule dispatch failed");
                (FireStatus::Failed, None, Some(e.to_string()))
            }
        };

        increment_counter!(
            "logsim_schedule_fires_total",
            "kind" => kind,
            "outcome" => status.to_string()
        );
        emit(
            &self.events,
            Event::ScheduleFired {
                id: schedule_id.to_string(),
                target: target.to_string(),
                status: status.to_string(),
            },
        );

        FireRecord {
            id: Uuid::new_v4().to_string(),
            schedule_id: schedule_id.to_string(),
            target: target.to_string(),
            status,
            fired_at: self.clock.now(),
            run_id,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::{Engine, EngineOptions};
    use crate::generator::LogGenerator;
    use crate::models::{
        CreateChainScheduleRequest, CreateScheduleRequest, GenerationResult, ScenarioConfig,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    struct StallingGenerator;

    #[async_trait]
    impl LogGenerator for StallingGenerator {
        async fn run(&self, _: &str, _: &ScenarioConfig) -> GenerationResult {
            std::future::pending::<()>().await;
            GenerationResult::default()
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn engine(clock: Arc<ManualClock>) -> Engine {
        Engine::new(Arc::new(StallingGenerator), clock, EngineOptions::default())
    }

    fn nightly(scenario_type: &str) -> CreateScheduleRequest {
        CreateScheduleRequest {
            name: "nightly".to_string(),
            scenario_type: scenario_type.to_string(),
            config: Default::default(),
            cron_expr: "0 2 * * *".to_string(),
            enabled: true,
            start_date: None,
            end_date: None,
        }
    }

    #[tokio::test]
    async fn test_tick_fires_once_at_due_instant() {
        let clock = Arc::new(ManualClock::new(at(2024, 3, 1, 10, 0)));
        let engine = engine(clock.clone());
        let scheduler = engine.scheduler(Duration::from_secs(1));
        let schedule = engine.schedules.create_schedule(nightly("load_test")).await.unwrap();

        clock.set(at(2024, 3, 2, 1, 59));
        assert_eq!(scheduler.tick().await, TickReport::default());

        clock.set(at(2024, 3, 2, 2, 0));
        let report = scheduler.tick().await;
        assert_eq!(report, TickReport { fired: 1, failed: 0 });
        assert!(engine.runner.is_active("load_test").await);

        let stored = engine.schedules.get_schedule(&schedule.id).await.unwrap();
        assert_eq!(stored.timing.next_run, Some(at(2024, 3, 3, 2, 0)));

        // same instant again: nothing left to fire
        assert_eq!(scheduler.tick().await.fired, 0);

        let fires = engine.schedules.schedule_fires(&schedule.id, 10).await.unwrap();
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].status, FireStatus::Completed);
        assert!(fires[0].run_id.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_recorded_and_tick_continues() {
        let clock = Arc::new(ManualClock::new(at(2024, 3, 1, 10, 0)));
        let engine = engine(clock.clone());
        let scheduler = engine.scheduler(Duration::from_secs(1));

        engine.runner.start("load_test", None).await.unwrap();
        let busy = engine.schedules.create_schedule(nightly("load_test")).await.unwrap();
        let free = engine.schedules.create_schedule(nightly("error_spike")).await.unwrap();

        clock.set(at(2024, 3, 2, 2, 0));
        let report = scheduler.tick().await;
        assert_eq!(report, TickReport { fired: 2, failed: 1 });

        let busy_fires = engine.schedules.schedule_fires(&busy.id, 10).await.unwrap();
        assert_eq!(busy_fires[0].status, FireStatus::Failed);
        assert!(busy_fires[0].error.is_some());
        let free_fires = engine.schedules.schedule_fires(&free.id, 10).await.unwrap();
        assert_eq!(free_fires[0].status, FireStatus::Completed);
    }

    #[tokio::test]
    async fn test_chain_schedule_starts_execution() {
        let clock = Arc::new(ManualClock::new(at(2024, 3, 1, 10, 0)));
        let engine = engine(clock.clone());
        let scheduler = engine.scheduler(Duration::from_secs(1));

        let schedule = engine
            .schedules
            .create_chain_schedule(CreateChainScheduleRequest {
                name: "every minute".to_string(),
                chain_id: "slow_and_steady".to_string(),
                cron_expr: "* * * * *".to_string(),
                enabled: true,
                start_date: None,
                end_date: None,
            })
            .await
            .unwrap();

        clock.set(at(2024, 3, 1, 10, 1));
        assert_eq!(scheduler.tick().await.fired, 1);

        let executions = engine.chains.executions("slow_and_steady", 10).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].triggered_by.as_deref(), Some(schedule.id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::new(at(2024, 3, 1, 10, 0)));
        let engine = engine(clock);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(engine.scheduler(Duration::from_secs(1)).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown.cancel();
        assert!(handle.await.is_ok());
    }
}
