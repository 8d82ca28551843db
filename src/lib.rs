//! Log Simulator Backend Library
//!
//! Scenario orchestration engine (runner, chains, cron schedules) behind an
//! HTTP API, plus the synthetic log generator it drives.

pub mod api;
pub mod clock;
pub mod config;
pub mod cron;
pub mod engine;
pub mod error;
pub mod events;
pub mod generator;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;
use crate::api::AppState;

/// Create the application router with the given state
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    let v1 = Router::new()
        // Logs and metrics
        .route("/generate", post(api::generate::generate))
        .route("/metrics", get(api::generate::metrics_handler))
        .route("/logs", get(api::generate::list_logs))
        .route("/logs/stats", get(api::generate::log_stats))
        // Scenarios
        .route("/scenarios/list", get(api::scenarios::list_scenarios))
        .route("/scenarios/start", post(api::scenarios::start_scenario))
        .route("/scenarios/stop", post(api::scenarios::stop_scenario))
        // Schedules
        .route(
            "/schedules",
            get(api::schedules::list_schedules).post(api::schedules::create_schedule),
        )
        .route("/schedules/cron/examples", get(api::schedules::cron_examples))
        .route(
            "/schedules/:id",
            get(api::schedules::get_schedule)
                .put(api::schedules::update_schedule)
                .delete(api::schedules::delete_schedule),
        )
        .route("/schedules/:id/enable", post(api::schedules::enable_schedule))
        .route("/schedules/:id/disable", post(api::schedules::disable_schedule))
        .route(
            "/schedules/:id/executions",
            get(api::schedules::schedule_executions),
        )
        // Chain schedules
        .route(
            "/chains/schedules",
            get(api::chains::list_chain_schedules).post(api::chains::create_chain_schedule),
        )
        .route(
            "/chains/schedules/:id",
            get(api::chains::get_chain_schedule)
                .put(api::chains::update_chain_schedule)
                .delete(api::chains::delete_chain_schedule),
        )
        .route(
            "/chains/schedules/:id/enable",
            post(api::chains::enable_chain_schedule),
        )
        .route(
            "/chains/schedules/:id/disable",
            post(api::chains::disable_chain_schedule),
        )
        .route(
            "/chains/schedules/:id/executions",
            get(api::chains::chain_schedule_executions),
        )
        // Chains
        .route(
            "/chains",
            get(api::chains::list_chains).post(api::chains::create_chain),
        )
        .route(
            "/chains/:id",
            get(api::chains::get_chain).delete(api::chains::delete_chain),
        )
        .route("/chains/:id/start", post(api::chains::start_chain))
        // `:id` here is an execution id
        .route("/chains/:id/stop", post(api::chains::stop_execution))
        .route(
            "/chains/executions/:id/stop",
            post(api::chains::stop_execution),
        )
        .route("/chains/:id/executions", get(api::chains::chain_executions));

    Router::new()
        // Health and Prometheus scrape (unprefixed)
        .route("/health", get(api::health::health_check))
        .route("/metrics", get(api::generate::metrics_handler))
        .nest("/api/v1", v1)
        // WebSocket
        .route("/ws/events", get(api::ws::ws_handler))
        // OpenAPI / Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// CORS from a comma separated origin list; "*" allows any origin
fn cors_layer(allowed_origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if allowed_origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}
