//! Scheduling engine: scenario runner, chains, schedules and the tick loop
//!
//! Everything is wired explicitly in [`Engine::new`]; there is no global
//! state, so tests can build as many independent engines as they like.

mod chains;
mod executor;
mod registry;
mod runner;
mod scheduler;
mod schedules;

pub use chains::ChainStore;
pub use executor::ChainExecutor;
pub use registry::{predefined_chains, ScenarioRegistry};
pub use runner::{RunnerSnapshot, ScenarioRunner};
pub use scheduler::{Scheduler, TickReport};
pub use schedules::{ScheduleStore, Scheduled};

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::Config;
use crate::events::{self, EventSender};
use crate::generator::LogGenerator;

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Executions kept per chain and fire records kept per schedule
    pub execution_history_limit: usize,
    /// Finished scenario instances kept for `recent`
    pub scenario_history_limit: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            execution_history_limit: 100,
            scenario_history_limit: 200,
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            execution_history_limit: config.execution_history_limit,
            scenario_history_limit: config.scenario_history_limit,
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<ScenarioRegistry>,
    pub runner: ScenarioRunner,
    pub chains: Arc<ChainStore>,
    pub executor: ChainExecutor,
    pub schedules: Arc<ScheduleStore>,
    pub events: EventSender,
}

impl Engine {
    pub fn new(
        generator: Arc<dyn LogGenerator>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        let events = events::channel();
        let registry = Arc::new(ScenarioRegistry::builtin());

        let runner = ScenarioRunner::new(
            registry.clone(),
            generator,
            clock.clone(),
            events.clone(),
            options.scenario_history_limit,
        );
        let chains = Arc::new(ChainStore::new(
            registry.clone(),
            clock.clone(),
            options.execution_history_limit,
            predefined_chains(clock.now()),
        ));
        let executor =
            ChainExecutor::new(chains.clone(), runner.clone(), clock.clone(), events.clone());
        let schedules = Arc::new(ScheduleStore::new(
            registry.clone(),
            chains.clone(),
            clock.clone(),
            events.clone(),
            options.execution_history_limit,
        ));

        Self {
            clock,
            registry,
            runner,
            chains,
            executor,
            schedules,
            events,
        }
    }

    pub fn scheduler(&self, tick_interval: Duration) -> Scheduler {
        Scheduler::new(
            self.schedules.clone(),
            self.runner.clone(),
            self.executor.clone(),
            self.clock.clone(),
            self.events.clone(),
            tick_interval,
        )
    }
}
