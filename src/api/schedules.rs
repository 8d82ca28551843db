//! Scenario schedule endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::response::{Ack, LimitParams};
use crate::api::AppState;
use crate::error::AppResult;
use crate::models::{
    CreateScheduleRequest, CronExample, FireRecord, Schedule, UpdateScheduleRequest,
};

/// Default and maximum number of fire records per request
pub(crate) const FIRE_LIMIT_DEFAULT: usize = 10;
pub(crate) const FIRE_LIMIT_MAX: usize = 100;

#[derive(Debug, Serialize, ToSchema)]
pub struct ScheduleList {
    pub schedules: Vec<Schedule>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FireRecordList {
    pub executions: Vec<FireRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CronExampleList {
    pub examples: Vec<CronExample>,
}

#[utoipa::path(
    get,
    path = "/api/v1/schedules",
    tag = "schedules",
    responses(
        (status = 200, description = "All scenario schedules", body = ScheduleList),
    )
)]
pub async fn list_schedules(State(state): State<AppState>) -> Json<ScheduleList> {
    let schedules = state.engine.schedules.list_schedules().await;
    let count = schedules.len();
    Json(ScheduleList { schedules, count })
}

#[utoipa::path(
    post,
    path = "/api/v1/schedules",
    tag = "schedules",
    request_body = CreateScheduleRequest,
    responses(
        (status = 200, description = "Schedule created", body = Schedule),
        (status = 400, description = "Invalid cron, window or scenario type", body = super::response::ApiResponse),
    )
)]
pub async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> AppResult<Json<Schedule>> {
    Ok(Json(state.engine.schedules.create_schedule(req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/schedules/{id}",
    tag = "schedules",
    params(("id" = String, Path, description = "Schedule ID")),
    responses(
        (status = 200, description = "Schedule", body = Schedule),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Schedule>> {
    Ok(Json(state.engine.schedules.get_schedule(&id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/schedules/{id}",
    tag = "schedules",
    params(("id" = String, Path, description = "Schedule ID")),
    request_body = UpdateScheduleRequest,
    responses(
        (status = 200, description = "Schedule updated", body = Schedule),
        (status = 400, description = "Invalid update", body = super::response::ApiResponse),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateScheduleRequest>,
) -> AppResult<Json<Schedule>> {
    Ok(Json(state.engine.schedules.update_schedule(&id, req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/schedules/{id}",
    tag = "schedules",
    params(("id" = String, Path, description = "Schedule ID")),
    responses(
        (status = 200, description = "Schedule deleted", body = Ack),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Ack>> {
    state.engine.schedules.delete_schedule(&id).await?;
    Ok(Json(Ack::new(format!("Schedule {} deleted", id))))
}

#[utoipa::path(
    post,
    path = "/api/v1/schedules/{id}/enable",
    tag = "schedules",
    params(("id" = String, Path, description = "Schedule ID")),
    responses(
        (status = 200, description = "Schedule enabled", body = Schedule),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
        (status = 409, description = "Already enabled", body = super::response::ApiResponse),
    )
)]
pub async fn enable_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Schedule>> {
    Ok(Json(state.engine.schedules.enable_schedule(&id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/schedules/{id}/disable",
    tag = "schedules",
    params(("id" = String, Path, description = "Schedule ID")),
    responses(
        (status = 200, description = "Schedule disabled", body = Schedule),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
        (status = 409, description = "Already disabled", body = super::response::ApiResponse),
    )
)]
pub async fn disable_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Schedule>> {
    Ok(Json(state.engine.schedules.disable_schedule(&id).await?))
}

/// Recent fires of a schedule, newest first
#[utoipa::path(
    get,
    path = "/api/v1/schedules/{id}/executions",
    tag = "schedules",
    params(("id" = String, Path, description = "Schedule ID"), LimitParams),
    responses(
        (status = 200, description = "Fire records", body = FireRecordList),
        (status = 404, description = "Not found", body = super::response::ApiResponse),
    )
)]
pub async fn schedule_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> AppResult<Json<FireRecordList>> {
    let limit = params.resolve(FIRE_LIMIT_DEFAULT, FIRE_LIMIT_MAX);
    let executions = state.engine.schedules.schedule_fires(&id, limit).await?;
    let count = executions.len();
    Ok(Json(FireRecordList { executions, count }))
}

#[utoipa::path(
    get,
    path = "/api/v1/schedules/cron/examples",
    tag = "schedules",
    responses(
        (status = 200, description = "Common cron expressions", body = CronExampleList),
    )
)]
pub async fn cron_examples() -> Json<CronExampleList> {
    let examples = [
        ("* * * * *", "Every minute"),
        ("*/5 * * * *", "Every 5 minutes"),
        ("0 * * * *", "Every hour"),
        ("0 2 * * *", "Every day at 02:00"),
        ("0 9 * * MON-FRI", "Weekdays at 09:00"),
        ("0 0 * * SUN", "Every Sunday at midnight"),
        ("30 18 1 * *", "First day of the month at 18:30"),
        ("0 */6 * * *", "Every 6 hours"),
    ]
    .into_iter()
    .map(|(expression, description)| CronExample {
        expression: expression.to_string(),
        description: description.to_string(),
    })
    .collect();

    Json(CronExampleList { examples })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::CronExpression;

    #[tokio::test]
    async fn test_cron_examples_all_parse() {
        let Json(list) = cron_examples().await;
        assert!(!list.examples.is_empty());
        for example in list.examples {
            assert!(
                CronExpression::parse(&example.expression).is_ok(),
                "{}",
                example.expression
            );
        }
    }
}
