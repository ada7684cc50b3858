//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use lifeplan::clock::{Clock, FixedClock};
use lifeplan::config::PlannerConfig;
use lifeplan::planner::Planner;

fn app() -> Router {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap(),
    ));
    let planner = Planner::in_memory(PlannerConfig::default())
        .unwrap()
        .with_clock(clock as Arc<dyn Clock>);
    lifeplan::server::router(Arc::new(planner))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_needs_no_identity() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = app();
    let (status, body) = send(&app, "GET", "/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(&app, "GET", "/plans/today", Some("  "), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn task_crud_round() {
    let app = app();
    let user = Some("alice");

    let (status, created) = send(
        &app,
        "POST",
        "/tasks",
        user,
        Some(json!({"title": "Write report", "priority": 80, "estimated_duration": 90})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["is_approved"], true);
    assert_eq!(created["status"], "pending");

    let (status, fetched) = send(&app, "GET", &format!("/tasks/{id}"), user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Write report");

    let (status, page) = send(&app, "GET", "/tasks?status=pending&page=1&page_size=10", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["page"], 1);
    assert_eq!(page["page_size"], 10);
    assert_eq!(page["tasks"][0]["id"], id.as_str());

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/tasks/{id}"),
        user,
        Some(json!({"title": "Write the report", "status": "in_progress"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Write the report");
    assert_eq!(updated["status"], "in_progress");

    let (status, _) = send(&app, "DELETE", &format!("/tasks/{id}"), user, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, "GET", &format!("/tasks/{id}"), user, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "task_not_found");
}

#[tokio::test]
async fn invalid_input_is_unprocessable() {
    let app = app();
    let user = Some("alice");

    let (status, body) = send(
        &app,
        "POST",
        "/tasks",
        user,
        Some(json!({"title": "x", "priority": 500})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["retryable"], false);

    let (status, _) = send(&app, "POST", "/plans/regenerate?date=2025-13-40", user, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        "PUT",
        "/settings",
        user,
        Some(json!({"timezone": "Mars/Olympus"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn completed_tasks_cannot_be_approved() {
    let app = app();
    let user = Some("alice");
    let (_, created) = send(
        &app,
        "POST",
        "/tasks",
        user,
        Some(json!({"title": "draft", "ai_generated": true})),
    )
    .await;
    assert_eq!(created["is_approved"], false);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, done) = send(&app, "POST", &format!("/tasks/{id}/complete"), user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    let (status, body) = send(&app, "POST", &format!("/tasks/{id}/approve"), user, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn plan_lifecycle_over_http() {
    let app = app();
    let user = Some("alice");

    let (status, body) = send(&app, "GET", "/plans/today", user, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "plan_not_found");

    send(
        &app,
        "POST",
        "/tasks",
        user,
        Some(json!({
            "title": "A",
            "priority": 90,
            "estimated_duration": 120,
            "due_date": "2025-06-03T06:00:00Z"
        })),
    )
    .await;
    send(
        &app,
        "POST",
        "/tasks",
        user,
        Some(json!({"title": "B", "priority": 40, "estimated_duration": 480})),
    )
    .await;

    let (status, plan) = send(&app, "POST", "/plans/regenerate", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["date"], "2025-06-02");
    assert_eq!(plan["total_duration"], 480);
    assert_eq!(plan["tasks"][0]["title"], "A");
    assert_eq!(plan["tasks"][1]["partial"], true);
    assert_eq!(plan["tasks"][1]["scheduled_duration"], 360);
    assert_eq!(plan["overload_info"]["is_overloaded"], true);
    assert!(plan["ai_recommendations"].is_string());

    let (status, today) = send(&app, "GET", "/plans/today", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(today["generation"], plan["generation"]);
    let (status, by_date) = send(&app, "GET", "/plans/2025-06-02", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_date["generation"], plan["generation"]);

    // Another user sees nothing.
    let (status, _) = send(&app, "GET", "/plans/today", Some("bob"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, suggestions) = send(&app, "GET", "/ai-los/suggestions", user, None).await;
    assert_eq!(status, StatusCode::OK);
    let first = suggestions[0]["id"].as_str().unwrap().to_string();
    assert_eq!(suggestions[0]["type"], "reschedule");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/ai-los/suggestions/{first}/dismiss"),
        user,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (_, after) = send(&app, "GET", "/ai-los/suggestions", user, None).await;
    assert!(after.as_array().unwrap().iter().all(|s| s["id"] != first.as_str()));
}

#[tokio::test]
async fn settings_round_trip() {
    let app = app();
    let user = Some("alice");

    let (status, defaults) = send(&app, "GET", "/settings", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(defaults["daily_budget_minutes"], 480);

    let (status, saved) = send(
        &app,
        "PUT",
        "/settings",
        user,
        Some(json!({"daily_budget_minutes": 300, "day_start": "08:00"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["daily_budget_minutes"], 300);
    assert_eq!(saved["day_start"], "08:00");

    let (_, plan) = send(&app, "POST", "/plans/regenerate?date=2025-06-03", user, None).await;
    assert_eq!(plan["budget_minutes"], 300);
    assert_eq!(plan["date"], "2025-06-03");
}
