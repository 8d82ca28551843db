//! Chain and chain schedule endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::schedules::{FireRecordList, FIRE_LIMIT_DEFAULT, FIRE_LIMIT_MAX};
use crate::api::response::{Ack, LimitParams};
use crate::api::AppState;
use crate::error::AppResult;
use crate::models::{
    Chain, ChainExecution, ChainSchedule, CreateChainRequest, CreateChainScheduleRequest,
    UpdateChainScheduleRequest,
};

const EXECUTION_LIMIT_DEFAULT: usize = 20;

#[derive(Debug, Serialize, ToSchema)]
pub struct ChainList {
    pub chains: Vec<Chain>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionList {
    pub executions: Vec<ChainExecution>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChainScheduleList {
    pub schedules: Vec<ChainSchedule>,
    pub count: usize,
}

// ============================================================================
// Chains
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/chains",
    tag = "chains",
    responses(
        (status = 200, description = "All chains, predefined included", body = ChainList),
    )
)]
pub async fn list_chains(State(state): State<AppState>) -> Json<ChainList> {
    let chains = state.engine.chains.list().await;
    let count = chains.len();
    Json(ChainList { chains, count })
}

#[utoipa::path(
    post,
    path = "/api/v1/chains",
    tag = "chains",
    request_body = CreateChainRequest,
    responses(
        (status = 200, description = "Chain created", body = Chain),
        (status = 400, description = "Empty steps or unknown scenario type", body = super::response::ApiResponse),
    )
)]
pub async fn create_chain(
    State(state): State<AppState>,
    Json(req): Json<CreateChainRequest>,
) -> AppResult<Json<Chain>> {
    Ok(Json(state.engine.chains.create(req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/chains/{id}",
    tag = "chains",
    params(("id" = String, Path, description = "Chain ID")),
    responses(
        (status = 200, description = "Chain", body = Chain),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn get_chain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Chain>> {
    Ok(Json(state.engine.chains.get(&id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/chains/{id}",
    tag = "chains",
    params(("id" = String, Path, description = "Chain ID")),
    responses(
        (status = 200, description = "Chain deleted", body = Ack),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
        (status = 409, description = "An execution is in progress", body = super::response::ApiResponse),
    )
)]
pub async fn delete_chain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Ack>> {
    state.engine.executor.delete_chain(&id).await?;
    Ok(Json(Ack::new(format!("Chain {} deleted", id))))
}

/// Start a new execution
#[utoipa::path(
    post,
    path = "/api/v1/chains/{id}/start",
    tag = "chains",
    params(("id" = String, Path, description = "Chain ID")),
    responses(
        (status = 200, description = "Execution started", body = ChainExecution),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
        (status = 409, description = "Chain already running", body = super::response::ApiResponse),
    )
)]
pub async fn start_chain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ChainExecution>> {
    Ok(Json(state.engine.executor.start(&id, None).await?))
}

/// Stop an in-flight execution by execution id
#[utoipa::path(
    post,
    path = "/api/v1/chains/executions/{id}/stop",
    tag = "chains",
    params(("id" = String, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Execution stopped", body = ChainExecution),
        (status = 404, description = "Execution not running", body = super::response::ApiResponse),
    )
)]
pub async fn stop_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ChainExecution>> {
    Ok(Json(state.engine.executor.stop(&id).await?))
}

/// Recent executions of a chain, newest first
#[utoipa::path(
    get,
    path = "/api/v1/chains/{id}/executions",
    tag = "chains",
    params(("id" = String, Path, description = "Chain ID"), LimitParams),
    responses(
        (status = 200, description = "Executions", body = ExecutionList),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn chain_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> AppResult<Json<ExecutionList>> {
    let limit = params.resolve(EXECUTION_LIMIT_DEFAULT, state.config.execution_history_limit);
    let executions = state.engine.chains.executions(&id, limit).await?;
    let count = executions.len();
    Ok(Json(ExecutionList { executions, count }))
}

// ============================================================================
// Chain schedules
// ============================================================================

#[utoipa::path(
    get,
    path = "/api/v1/chains/schedules",
    tag = "chain-schedules",
    responses(
        (status = 200, description = "All chain schedules", body = ChainScheduleList),
    )
)]
pub async fn list_chain_schedules(State(state): State<AppState>) -> Json<ChainScheduleList> {
    let schedules = state.engine.schedules.list_chain_schedules().await;
    let count = schedules.len();
    Json(ChainScheduleList { schedules, count })
}

#[utoipa::path(
    post,
    path = "/api/v1/chains/schedules",
    tag = "chain-schedules",
    request_body = CreateChainScheduleRequest,
    responses(
        (status = 200, description = "Chain schedule created", body = ChainSchedule),
        (status = 400, description = "Invalid cron, window or chain", body = super::response::ApiResponse),
    )
)]
pub async fn create_chain_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateChainScheduleRequest>,
) -> AppResult<Json<ChainSchedule>> {
    Ok(Json(state.engine.schedules.create_chain_schedule(req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/chains/schedules/{id}",
    tag = "chain-schedules",
    params(("id" = String, Path, description = "Chain schedule ID")),
    responses(
        (status = 200, description = "Chain schedule", body = ChainSchedule),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn get_chain_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ChainSchedule>> {
    Ok(Json(state.engine.schedules.get_chain_schedule(&id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/chains/schedules/{id}",
    tag = "chain-schedules",
    params(("id" = String, Path, description = "Chain schedule ID")),
    request_body = UpdateChainScheduleRequest,
    responses(
        (status = 200, description = "Chain schedule updated", body = ChainSchedule),
        (status = 400, description = "Invalid update", body = super::response::ApiResponse),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn update_chain_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateChainScheduleRequest>,
) -> AppResult<Json<ChainSchedule>> {
    Ok(Json(
        state.engine.schedules.update_chain_schedule(&id, req).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/chains/schedules/{id}",
    tag = "chain-schedules",
    params(("id" = String, Path, description = "Chain schedule ID")),
    responses(
        (status = 200, description = "Chain schedule deleted", body = Ack),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn delete_chain_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Ack>> {
    state.engine.schedules.delete_chain_schedule(&id).await?;
    Ok(Json(Ack::new(format!("Chain schedule {} deleted", id))))
}

#[utoipa::path(
    post,
    path = "/api/v1/chains/schedules/{id}/enable",
    tag = "chain-schedules",
    params(("id" = String, Path, description = "Chain schedule ID")),
    responses(
        (status = 200, description = "Chain schedule enabled", body = ChainSchedule),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
        (status = 409, description = "Already enabled", body = super::response::ApiResponse),
    )
)]
pub async fn enable_chain_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ChainSchedule>> {
    Ok(Json(state.engine.schedules.enable_chain_schedule(&id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/chains/schedules/{id}/disable",
    tag = "chain-schedules",
    params(("id" = String, Path, description = "Chain schedule ID")),
    responses(
        (status = 200, description = "Chain schedule disabled", body = ChainSchedule),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
        (status = 409, description = "Already disabled", body = super::response::ApiResponse),
    )
)]
pub async fn disable_chain_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ChainSchedule>> {
    Ok(Json(state.engine.schedules.disable_chain_schedule(&id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/chains/schedules/{id}/executions",
    tag = "chain-schedules",
    params(("id" = String, Path, description = "Chain schedule ID"), LimitParams),
    responses(
        (status = 200, description = "Fire records", body = FireRecordList),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn chain_schedule_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> AppResult<Json<FireRecordList>> {
    let limit = params.resolve(FIRE_LIMIT_DEFAULT, FIRE_LIMIT_MAX);
    let executions = state.engine.schedules.chain_schedule_fires(&id, limit).await?;
    let count = executions.len();
    Ok(Json(FireRecordList { executions, count }))
}
