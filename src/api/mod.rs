pub mod chains;
pub mod generate;
pub mod health;
pub mod openapi;
pub mod response;
pub mod scenarios;
pub mod schedules;
pub mod ws;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::engine::{Engine, EngineOptions};
use crate::generator::SyntheticLogGenerator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Read side of the generator that the engine writes through
    pub logs: Arc<SyntheticLogGenerator>,
    pub config: Config,
    /// Set by the binary once a Prometheus recorder is installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let logs = Arc::new(SyntheticLogGenerator::new(config.log_buffer_capacity));
        let engine = Engine::new(
            logs.clone(),
            Arc::new(SystemClock),
            EngineOptions::from(&config),
        );
        Self::with_engine(engine, logs, config)
    }

    pub fn with_engine(engine: Engine, logs: Arc<SyntheticLogGenerator>, config: Config) -> Self {
        Self {
            engine,
            logs,
            config,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}
