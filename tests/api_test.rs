//! Integration tests for the API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use logsim_backend::{api::AppState, config::Config};

fn setup_app() -> Router {
    let state = AppState::new(Config::default());
    logsim_backend::create_router(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    payload: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let app = setup_app();
    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_i64());
    assert_eq!(json["services"]["scenario_manager"], true);
}

#[tokio::test]
async fn test_scenario_lifecycle() {
    let app = setup_app();

    let (status, started) = send(
        &app,
        "POST",
        "/api/v1/scenarios/start",
        Some(json!({"type": "load_test", "config": {"log_count": 50}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["type"], "load_test");
    assert_eq!(started["active"], true);
    assert_eq!(started["config"]["log_count"], 50);

    let (status, conflict) = send(
        &app,
        "POST",
        "/api/v1/scenarios/start",
        Some(json!({"type": "load_test"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["success"], false);
    assert_eq!(conflict["error"]["code"], "CONFLICT");

    let (status, listing) = send(&app, "GET", "/api/v1/scenarios/list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["available"].as_array().unwrap().len(), 5);
    assert_eq!(listing["active"].as_array().unwrap().len(), 1);
    assert!(listing["chains"]["black_friday_rush"].is_object());

    let (status, stopped) = send(
        &app,
        "POST",
        "/api/v1/scenarios/stop",
        Some(json!({"type": "load_test"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["active"], false);
    assert_eq!(stopped["outcome"], "stopped");

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/scenarios/stop",
        Some(json!({"type": "load_test"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_scenario_type_is_rejected() {
    let app = setup_app();
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/scenarios/start",
        Some(json!({"type": "meteor_strike"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_scenario_config_bounds_are_validated() {
    let app = setup_app();

    for config in [
        json!({"interval_seconds": 1e20, "duration_seconds": 1}),
        json!({"end_date": "2000-01-01T00:00:00Z"}),
        json!({"start_date": "not-a-date"}),
    ] {
        let (status, json) = send(
            &app,
            "POST",
            "/api/v1/scenarios/start",
            Some(json!({"type": "error_spike", "config": config})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    let (_, listing) = send(&app, "GET", "/api/v1/scenarios/list", None).await;
    assert_eq!(listing["active"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_schedule_crud_and_toggle() {
    let app = setup_app();

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/schedules",
        Some(json!({
            "name": "broken",
            "scenario_type": "load_test",
            "cron_expr": "60 * * * *",
            "enabled": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");

    let (status, created) = send(
        &app,
        "POST",
        "/api/v1/schedules",
        Some(json!({
            "name": "nightly load",
            "scenario_type": "load_test",
            "cron_expr": "0 2 * * *",
            "enabled": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["enabled"], true);
    assert!(created["next_run"].is_string());
    let id = created["id"].as_str().unwrap().to_string();

    let (status, disabled) =
        send(&app, "POST", &format!("/api/v1/schedules/{}/disable", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(disabled["enabled"], false);
    assert!(disabled["next_run"].is_null());

    let (status, _) = send(&app, "POST", &format!("/api/v1/schedules/{}/disable", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, enabled) =
        send(&app, "POST", &format!("/api/v1/schedules/{}/enable", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(enabled["next_run"].is_string());

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/v1/schedules/{}", id),
        Some(json!({"name": "renamed", "cron_expr": "*/15 * * * *"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "renamed");
    assert_eq!(updated["cron_expr"], "*/15 * * * *");

    let (status, list) = send(&app, "GET", "/api/v1/schedules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);

    let (status, fires) =
        send(&app, "GET", &format!("/api/v1/schedules/{}/executions", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fires["count"], 0);

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, "GET", &format!("/api/v1/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_schedule_window_validation() {
    let app = setup_app();
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/schedules",
        Some(json!({
            "name": "reversed",
            "scenario_type": "error_spike",
            "cron_expr": "* * * * *",
            "start_date": "2030-02-01T00:00:00Z",
            "end_date": "2030-01-01T00:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = send(
        &app,
        "POST",
        "/api/v1/schedules",
        Some(json!({
            "name": "future",
            "scenario_type": "error_spike",
            "cron_expr": "0 2 * * *",
            "enabled": true,
            "start_date": "2030-01-01T00:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["next_run"], "2030-01-01T02:00:00Z");
}

#[tokio::test]
async fn test_chain_lifecycle() {
    let app = setup_app();

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/chains",
        Some(json!({"name": "empty", "steps": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");

    let (status, chain) = send(
        &app,
        "POST",
        "/api/v1/chains",
        Some(json!({
            "name": "release drill",
            "steps": [
                {"scenario_type": "normal_operation", "delay_before": 600},
                {"scenario_type": "error_spike"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chain_id = chain["id"].as_str().unwrap().to_string();

    let (status, execution) =
        send(&app, "POST", &format!("/api/v1/chains/{}/start", chain_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(execution["status"], "running");
    let execution_id = execution["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "POST", &format!("/api/v1/chains/{}/start", chain_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/chains/{}", chain_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, stopped) = send(
        &app,
        "POST",
        &format!("/api/v1/chains/executions/{}/stop", execution_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["status"], "stopped");

    let (status, _) =
        send(&app, "POST", &format!("/api/v1/chains/{}/stop", execution_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, history) =
        send(&app, "GET", &format!("/api/v1/chains/{}/executions", chain_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["count"], 1);
    assert_eq!(history["executions"][0]["status"], "stopped");

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/chains/{}", chain_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", &format!("/api/v1/chains/{}", chain_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chain_list_includes_predefined() {
    let app = setup_app();
    let (status, json) = send(&app, "GET", "/api/v1/chains", None).await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json["chains"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["id"].as_str())
        .collect();
    assert!(ids.contains(&"black_friday_rush"));
    assert!(ids.contains(&"slow_and_steady"));
}

#[tokio::test]
async fn test_chain_schedule_crud() {
    let app = setup_app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/chains/schedules",
        Some(json!({"name": "ghost", "chain_id": "missing", "cron_expr": "* * * * *"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = send(
        &app,
        "POST",
        "/api/v1/chains/schedules",
        Some(json!({
            "name": "weekday rush",
            "chain_name": "black_friday_rush",
            "cron_expr": "0 9 * * MON-FRI",
            "enabled": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["chain_id"], "black_friday_rush");
    assert!(created["next_run"].is_string());
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) =
        send(&app, "POST", &format!("/api/v1/chains/schedules/{}/enable", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, disabled) =
        send(&app, "POST", &format!("/api/v1/chains/schedules/{}/disable", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(disabled["next_run"].is_null());

    let (status, list) = send(&app, "GET", "/api/v1/chains/schedules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/chains/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &format!("/api/v1/chains/schedules/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_and_read_logs() {
    let app = setup_app();

    let (status, _) = send(&app, "POST", "/api/v1/generate", Some(json!({"log_count": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, generated) = send(
        &app,
        "POST",
        "/api/v1/generate",
        Some(json!({"log_count": 25, "scenario": "manual"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(generated["generated"], 25);
    assert!(generated["sample_log"].is_object());

    let (status, logs) = send(&app, "GET", "/api/v1/logs?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["count"], 10);

    let (status, stats) = send(&app, "GET", "/api/v1/logs/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_logs"], 25);

    let (status, metrics) = send(&app, "GET", "/api/v1/metrics?format=json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(metrics["count"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_prometheus_exposition() {
    let app = setup_app();
    send(&app, "POST", "/api/v1/generate", Some(json!({"log_count": 5}))).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("# TYPE"));
}

#[tokio::test]
async fn test_cron_examples() {
    let app = setup_app();
    let (status, json) = send(&app, "GET", "/api/v1/schedules/cron/examples", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(!json["examples"].as_array().unwrap().is_empty());
}
