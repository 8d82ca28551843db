use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// Scheduler resolution
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Chain executions and schedule fire records kept per owner
    #[serde(default = "default_execution_history_limit")]
    pub execution_history_limit: usize,

    #[serde(default = "default_scenario_history_limit")]
    pub scenario_history_limit: usize,

    #[serde(default = "default_log_buffer_capacity")]
    pub log_buffer_capacity: usize,

    /// Upper bound for one-shot generation
    #[serde(default = "default_max_generate_count")]
    pub max_generate_count: usize,

    /// Comma separated; "*" allows any origin
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_execution_history_limit() -> usize {
    100
}

fn default_scenario_history_limit() -> usize {
    200
}

fn default_log_buffer_capacity() -> usize {
    50_000
}

fn default_max_generate_count() -> usize {
    10_000
}

fn default_cors_allowed_origins() -> String {
    "*".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let settings: Config = config
            .try_deserialize()
            .unwrap_or_else(|_| Config::default());

        Ok(settings)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            environment: default_environment(),
            tick_interval_ms: default_tick_interval_ms(),
            execution_history_limit: default_execution_history_limit(),
            scenario_history_limit: default_scenario_history_limit(),
            log_buffer_capacity: default_log_buffer_capacity(),
            max_generate_count: default_max_generate_count(),
            cors_allowed_origins: default_cors_allowed_origins(),
            log_format: default_log_format(),
        }
    }
}
