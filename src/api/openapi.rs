//! OpenAPI documentation for the log simulator API

use utoipa::OpenApi;

/// API Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Log Simulator API",
        version = "1.0.0",
        description = "Synthetic log and metric generator with scenario orchestration.\n\n## Features\n- Start and stop load scenarios\n- Compose scenarios into chains\n- Trigger scenarios and chains from cron schedules\n- Inspect generated logs and metrics",
        license(name = "MIT"),
        contact(name = "Log Simulator Team")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    tags(
        (name = "health", description = "Service health"),
        (name = "logs", description = "Log generation and inspection"),
        (name = "metrics", description = "Generated metrics and engine self-metrics"),
        (name = "scenarios", description = "Scenario catalog and lifecycle"),
        (name = "schedules", description = "Cron schedules for scenarios"),
        (name = "chains", description = "Scenario chains and their executions"),
        (name = "chain-schedules", description = "Cron schedules for chains"),
        (name = "events", description = "Engine event stream")
    ),
    paths(
        // Health
        crate::api::health::health_check,
        // Logs / metrics
        crate::api::generate::generate,
        crate::api::generate::metrics_handler,
        crate::api::generate::list_logs,
        crate::api::generate::log_stats,
        // Scenarios
        crate::api::scenarios::list_scenarios,
        crate::api::scenarios::start_scenario,
        crate::api::scenarios::stop_scenario,
        // Schedules
        crate::api::schedules::list_schedules,
        crate::api::schedules::create_schedule,
        crate::api::schedules::get_schedule,
        crate::api::schedules::update_schedule,
        crate::api::schedules::delete_schedule,
        crate::api::schedules::enable_schedule,
        crate::api::schedules::disable_schedule,
        crate::api::schedules::schedule_executions,
        crate::api::schedules::cron_examples,
        // Chains
        crate::api::chains::list_chains,
        crate::api::chains::create_chain,
        crate::api::chains::get_chain,
        crate::api::chains::delete_chain,
        crate::api::chains::start_chain,
        crate::api::chains::stop_execution,
        crate::api::chains::chain_executions,
        // Chain schedules
        crate::api::chains::list_chain_schedules,
        crate::api::chains::create_chain_schedule,
        crate::api::chains::get_chain_schedule,
        crate::api::chains::update_chain_schedule,
        crate::api::chains::delete_chain_schedule,
        crate::api::chains::enable_chain_schedule,
        crate::api::chains::disable_chain_schedule,
        crate::api::chains::chain_schedule_executions,
        // WebSocket (note: ws endpoints may not render in Swagger UI)
        crate::api::ws::ws_handler,
    ),
    components(
        schemas(
            // Scenario schemas
            crate::models::ScenarioType,
            crate::models::ScenarioConfig,
            crate::models::ScenarioInstance,
            crate::models::InstanceOutcome,
            crate::models::ScenarioListing,
            crate::models::StartScenarioRequest,
            crate::models::StopScenarioRequest,
            // Chain schemas
            crate::models::Chain,
            crate::models::ChainStep,
            crate::models::CreateChainRequest,
            crate::models::ChainExecution,
            crate::models::ExecutionStatus,
            crate::models::StepRecord,
            crate::models::StepStatus,
            crate::api::chains::ChainList,
            crate::api::chains::ExecutionList,
            crate::api::chains::ChainScheduleList,
            // Schedule schemas
            crate::models::CronTiming,
            crate::models::Schedule,
            crate::models::ChainSchedule,
            crate::models::CreateScheduleRequest,
            crate::models::UpdateScheduleRequest,
            crate::models::CreateChainScheduleRequest,
            crate::models::UpdateChainScheduleRequest,
            crate::models::FireRecord,
            crate::models::FireStatus,
            crate::models::CronExample,
            crate::api::schedules::ScheduleList,
            crate::api::schedules::FireRecordList,
            crate::api::schedules::CronExampleList,
            // Log schemas
            crate::models::LogEntry,
            crate::models::LogStats,
            crate::models::Metric,
            crate::models::MetricKind,
            crate::models::GenerateRequest,
            crate::models::GenerateResponse,
            crate::api::generate::LogsResponse,
            crate::api::generate::MetricsResponse,
            // Health
            crate::api::health::HealthResponse,
            crate::api::health::ServiceHealth,
            // Common
            crate::api::response::ApiResponse,
            crate::api::response::ApiError,
            crate::api::response::Ack,
        )
    )
)]
pub struct ApiDoc;
