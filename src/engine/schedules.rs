//! Scenario and chain schedules
//!
//! Both kinds share the same trigger bookkeeping ([`CronTiming`]), so they
//! live in two instances of one generic table.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::chains::ChainStore;
use super::registry::ScenarioRegistry;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::events::{emit, Event, EventSender};
use crate::models::{
    ChainSchedule, CreateChainScheduleRequest, CreateScheduleRequest, CronTiming, FireRecord,
    Schedule, UpdateChainScheduleRequest, UpdateScheduleRequest,
};

/// A record that carries a cron trigger
pub trait Scheduled: Clone + Send + Sync {
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn timing(&self) -> &CronTiming;
    fn timing_mut(&mut self) -> &mut CronTiming;
    fn touch(&mut self, now: DateTime<Utc>);
}

impl Scheduled for Schedule {
    const KIND: &'static str = "Schedule";

    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn timing(&self) -> &CronTiming {
        &self.timing
    }
    fn timing_mut(&mut self) -> &mut CronTiming {
        &mut self.timing
    }
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Scheduled for ChainSchedule {
    const KIND: &'static str = "Chain schedule";

    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn timing(&self) -> &CronTiming {
        &self.timing
    }
    fn timing_mut(&mut self) -> &mut CronTiming {
        &mut self.timing
    }
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

struct CronTable<T> {
    entries: RwLock<HashMap<String, T>>,
    /// Fire history per schedule, newest first
    fires: RwLock<HashMap<String, VecDeque<FireRecord>>>,
    history_limit: usize,
}

impl<T: Scheduled> CronTable<T> {
    fn new(history_limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fires: RwLock::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }

    fn not_found(id: &str) -> AppError {
        AppError::NotFound(format!("{} {} not found", T::KIND, id))
    }

    async fn insert(&self, entry: T) {
        self.entries
            .write()
            .await
            .insert(entry.id().to_string(), entry);
    }

    async fn get(&self, id: &str) -> AppResult<T> {
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn list(&self) -> Vec<T> {
        let mut entries: Vec<T> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        entries
    }

    /// Mutate an entry in place; `f` sees the entry and may reject the change
    async fn modify<F>(&self, id: &str, now: DateTime<Utc>, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut T) -> AppResult<()>,
    {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        let mut draft = entry.clone();
        f(&mut draft)?;
        draft.touch(now);
        *entry = draft.clone();
        Ok(draft)
    }

    async fn remove(&self, id: &str) -> AppResult<T> {
        let removed = self
            .entries
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Self::not_found(id))?;
        self.fires.write().await.remove(id);
        Ok(removed)
    }

    /// Snapshot every due entry and advance its trigger past `now`
    async fn claim_due(&self, now: DateTime<Utc>) -> Vec<T> {
        let mut entries = self.entries.write().await;
        let mut due = Vec::new();
        for entry in entries.values_mut() {
            if !entry.timing().is_due(now) {
                continue;
            }
            due.push(entry.clone());

            let timing = entry.timing_mut();
            timing.last_run = Some(now);
            // the expression was validated on write
            if !timing.arm(now).unwrap_or(false) {
                debug!(id = %entry.id(), "Schedule window ended, disabling");
            }
        }
        due.sort_by(|a, b| a.created_at().cmp(&b.created_at()));
        due
    }

    async fn record_fire(&self, record: FireRecord) {
        let mut fires = self.fires.write().await;
        let history = fires.entry(record.schedule_id.clone()).or_default();
        history.push_front(record);
        history.truncate(self.history_limit);
    }

    async fn fires(&self, id: &str, limit: usize) -> AppResult<Vec<FireRecord>> {
        if !self.entries.read().await.contains_key(id) {
            return Err(Self::not_found(id));
        }
        Ok(self
            .fires
            .read()
            .await
            .get(id)
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Validate the expression and window, then arm or disarm per `enabled`.
/// Enabling an entry whose window has no fire left is a validation error.
fn apply_timing(timing: &mut CronTiming, enabled: bool, now: DateTime<Utc>) -> AppResult<()> {
    if !timing.window_is_valid() {
        return Err(AppError::validation("end_date must not be before start_date"));
    }
    if enabled {
        if !timing.arm(now)? {
            return Err(AppError::validation("Schedule window has no remaining runs"));
        }
    } else {
        // still surface a bad expression on a disabled schedule
        crate::cron::CronExpression::parse(&timing.cron_expr)?;
        timing.disarm();
    }
    Ok(())
}

pub struct ScheduleStore {
    registry: Arc<ScenarioRegistry>,
    chains: Arc<ChainStore>,
    clock: Arc<dyn Clock>,
    events: EventSender,
    scenario_schedules: CronTable<Schedule>,
    chain_schedules: CronTable<ChainSchedule>,
}

impl ScheduleStore {
    pub fn new(
        registry: Arc<ScenarioRegistry>,
        chains: Arc<ChainStore>,
        clock: Arc<dyn Clock>,
        events: EventSender,
        history_limit: usize,
    ) -> Self {
        Self {
            registry,
            chains,
            clock,
            events,
            scenario_schedules: CronTable::new(history_limit),
            chain_schedules: CronTable::new(history_limit),
        }
    }

    fn check_scenario_type(&self, scenario_type: &str) -> AppResult<()> {
        if self.registry.contains(scenario_type) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Unknown scenario type: {}",
                scenario_type
            )))
        }
    }

    async fn check_chain(&self, chain_id: &str) -> AppResult<()> {
        if self.chains.exists(chain_id).await {
            Ok(())
        } else {
            Err(AppError::Validation(format!("Unknown chain: {}", chain_id)))
        }
    }

    fn check_name(name: &str) -> AppResult<()> {
        if name.trim().is_empty() {
            Err(AppError::validation("Schedule name is required"))
        } else {
            Ok(())
        }
    }

    // ---- scenario schedules ----

    pub async fn create_schedule(&self, req: CreateScheduleRequest) -> AppResult<Schedule> {
        Self::check_name(&req.name)?;
        self.check_scenario_type(&req.scenario_type)?;

        let now = self.clock.now();
        let mut timing = CronTiming::new(req.cron_expr, req.start_date, req.end_date);
        apply_timing(&mut timing, req.enabled, now)?;

        let schedule = Schedule {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            scenario_type: req.scenario_type,
            config: req.config,
            timing,
            created_at: now,
            updated_at: now,
        };
        self.scenario_schedules.insert(schedule.clone()).await;

        info!(
            schedule_id = %schedule.id,
            scenario = %schedule.scenario_type,
            cron = %schedule.timing.cron_expr,
            next_run = ?schedule.timing.next_run,
            "Schedule created"
        );
        emit(&self.events, Event::ScheduleCreated { id: schedule.id.clone() });
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        id: &str,
        req: UpdateScheduleRequest,
    ) -> AppResult<Schedule> {
        if let Some(name) = &req.name {
            Self::check_name(name)?;
        }
        let now = self.clock.now();
        let schedule = self
            .scenario_schedules
            .modify(id, now, |s| {
                if let Some(name) = req.name {
                    s.name = name;
                }
                if let Some(config) = req.config {
                    s.config = config;
                }
                update_timing(
                    &mut s.timing,
                    req.cron_expr,
                    req.start_date,
                    req.end_date,
                    req.enabled,
                    now,
                )
            })
            .await?;

        info!(schedule_id = %id, next_run = ?schedule.timing.next_run, "Schedule updated");
        emit(&self.events, Event::ScheduleUpdated { id: id.to_string() });
        Ok(schedule)
    }

    pub async fn get_schedule(&self, id: &str) -> AppResult<Schedule> {
        self.scenario_schedules.get(id).await
    }

    pub async fn list_schedules(&self) -> Vec<Schedule> {
        self.scenario_schedules.list().await
    }

    pub async fn delete_schedule(&self, id: &str) -> AppResult<Schedule> {
        let removed = self.scenario_schedules.remove(id).await?;
        info!(schedule_id = %id, "Schedule deleted");
        emit(&self.events, Event::ScheduleDeleted { id: id.to_string() });
        Ok(removed)
    }

    pub async fn enable_schedule(&self, id: &str) -> AppResult<Schedule> {
        let now = self.clock.now();
        let schedule = self
            .scenario_schedules
            .modify(id, now, |s| enable(&mut s.timing, now))
            .await?;
        emit(&self.events, Event::ScheduleUpdated { id: id.to_string() });
        Ok(schedule)
    }

    pub async fn disable_schedule(&self, id: &str) -> AppResult<Schedule> {
        let now = self.clock.now();
        let schedule = self
            .scenario_schedules
            .modify(id, now, |s| disable(&mut s.timing))
            .await?;
        emit(&self.events, Event::ScheduleUpdated { id: id.to_string() });
        Ok(schedule)
    }

    pub async fn schedule_fires(&self, id: &str, limit: usize) -> AppResult<Vec<FireRecord>> {
        self.scenario_schedules.fires(id, limit).await
    }

    // ---- chain schedules ----

    pub async fn create_chain_schedule(
        &self,
        req: CreateChainScheduleRequest,
    ) -> AppResult<ChainSchedule> {
        Self::check_name(&req.name)?;
        self.check_chain(&req.chain_id).await?;

        let now = self.clock.now();
        let mut timing = CronTiming::new(req.cron_expr, req.start_date, req.end_date);
        apply_timing(&mut timing, req.enabled, now)?;

        let schedule = ChainSchedule {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            chain_id: req.chain_id,
            timing,
            created_at: now,
            updated_at: now,
        };
        self.chain_schedules.insert(schedule.clone()).await;

        info!(
            schedule_id = %schedule.id,
            chain_id = %schedule.chain_id,
            cron = %schedule.timing.cron_expr,
            "Chain schedule created"
        );
        emit(&self.events, Event::ScheduleCreated { id: schedule.id.clone() });
        Ok(schedule)
    }

    pub async fn update_chain_schedule(
        &self,
        id: &str,
        req: UpdateChainScheduleRequest,
    ) -> AppResult<ChainSchedule> {
        if let Some(name) = &req.name {
            Self::check_name(name)?;
        }
        if let Some(chain_id) = &req.chain_id {
            self.check_chain(chain_id).await?;
        }
        let now = self.clock.now();
        let schedule = self
            .chain_schedules
            .modify(id, now, |s| {
                if let Some(name) = req.name {
                    s.name = name;
                }
                if let Some(chain_id) = req.chain_id {
                    s.chain_id = chain_id;
                }
                update_timing(
                    &mut s.timing,
                    req.cron_expr,
                    req.start_date,
                    req.end_date,
                    req.enabled,
                    now,
                )
            })
            .await?;

        info!(schedule_id = %id, next_run = ?schedule.timing.next_run, "Chain schedule updated");
        emit(&self.events, Event::ScheduleUpdated { id: id.to_string() });
        Ok(schedule)
    }

    pub async fn get_chain_schedule(&self, id: &str) -> AppResult<ChainSchedule> {
        self.chain_schedules.get(id).await
    }

    pub async fn list_chain_schedules(&self) -> Vec<ChainSchedule> {
        self.chain_schedules.list().await
    }

    pub async fn delete_chain_schedule(&self, id: &str) -> AppResult<ChainSchedule> {
        let removed = self.chain_schedules.remove(id).await?;
        info!(schedule_id = %id, "Chain schedule deleted");
        emit(&self.events, Event::ScheduleDeleted { id: id.to_string() });
        Ok(removed)
    }

    pub async fn enable_chain_schedule(&self, id: &str) -> AppResult<ChainSchedule> {
        let now = self.clock.now();
        let schedule = self
            .chain_schedules
            .modify(id, now, |s| enable(&mut s.timing, now))
            .await?;
        emit(&self.events, Event::ScheduleUpdated { id: id.to_string() });
        Ok(schedule)
    }

    pub async fn disable_chain_schedule(&self, id: &str) -> AppResult<ChainSchedule> {
        let now = self.clock.now();
        let schedule = self
            .chain_schedules
            .modify(id, now, |s| disable(&mut s.timing))
            .await?;
        emit(&self.events, Event::ScheduleUpdated { id: id.to_string() });
        Ok(schedule)
    }

    pub async fn chain_schedule_fires(&self, id: &str, limit: usize) -> AppResult<Vec<FireRecord>> {
        self.chain_schedules.fires(id, limit).await
    }

    // ---- scheduler side ----

    /// Claim everything due at `now`; each claimed entry's `next_run` is
    /// already advanced when this returns.
    pub async fn claim_due(&self, now: DateTime<Utc>) -> (Vec<Schedule>, Vec<ChainSchedule>) {
        (
            self.scenario_schedules.claim_due(now).await,
            self.chain_schedules.claim_due(now).await,
        )
    }

    pub async fn record_scenario_fire(&self, record: FireRecord) {
        self.scenario_schedules.record_fire(record).await;
    }

    pub async fn record_chain_fire(&self, record: FireRecord) {
        self.chain_schedules.record_fire(record).await;
    }
}

fn enable(timing: &mut CronTiming, now: DateTime<Utc>) -> AppResult<()> {
    if timing.enabled {
        return Err(AppError::conflict("Schedule is already enabled"));
    }
    apply_timing(timing, true, now)
}

fn disable(timing: &mut CronTiming) -> AppResult<()> {
    if !timing.enabled {
        return Err(AppError::conflict("Schedule is already disabled"));
    }
    timing.disarm();
    Ok(())
}

fn update_timing(
    timing: &mut CronTiming,
    cron_expr: Option<String>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    enabled: Option<bool>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if let Some(expr) = cron_expr {
        timing.cron_expr = expr;
    }
    if start_date.is_some() {
        timing.start_date = start_date;
    }
    if end_date.is_some() {
        timing.end_date = end_date;
    }
    let enabled = enabled.unwrap_or(timing.enabled);
    apply_timing(timing, enabled, now)
}
