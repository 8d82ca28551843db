//! Scenario catalog and lifecycle endpoints

use axum::{extract::State, Json};

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::{ScenarioInstance, ScenarioListing, StartScenarioRequest, StopScenarioRequest};

/// Catalog, active instances, recent history and predefined chains
#[utoipa::path(
    get,
    path = "/api/v1/scenarios/list",
    tag = "scenarios",
    responses(
        (status = 200, description = "Scenario listing", body = ScenarioListing),
    )
)]
pub async fn list_scenarios(State(state): State<AppState>) -> Json<ScenarioListing> {
    let snapshot = state.engine.runner.list().await;
    let chains = state.engine.chains.predefined().await;

    Json(ScenarioListing {
        available: snapshot.available,
        active: snapshot.active,
        recent: snapshot.recent,
        chains,
    })
}

/// Start a scenario type
#[utoipa::path(
    post,
    path = "/api/v1/scenarios/start",
    tag = "scenarios",
    request_body = StartScenarioRequest,
    responses(
        (status = 200, description = "Instance started", body = ScenarioInstance),
        (status = 400, description = "Unknown type or bad config", body = super::response::ApiResponse),
        (status = 409, description = "Type already active", body = super::response::ApiResponse),
    )
)]
pub async fn start_scenario(
    State(state): State<AppState>,
    Json(req): Json<StartScenarioRequest>,
) -> AppResult<Json<ScenarioInstance>> {
    let instance = state
        .engine
        .runner
        .start(&req.scenario_type, req.config.as_ref())
        .await?;
    Ok(Json(instance))
}

/// Stop the active instance of a scenario type
#[utoipa::path(
    post,
    path = "/api/v1/scenarios/stop",
    tag = "scenarios",
    request_body = StopScenarioRequest,
    responses(
        (status = 200, description = "Instance stopped", body = ScenarioInstance),
        (status = 404, description = "Type not active", body = super::response::ApiResponse),
    )
)]
pub async fn stop_scenario(
    State(state): State<AppState>,
    Json(req): Json<StopScenarioRequest>,
) -> AppResult<Json<ScenarioInstance>> {
    let instance = state.engine.runner.stop(&req.scenario_type).await?;
    Ok(Json(instance))
}
