use std::time::Duration;

use cvitanok_core::CacheService;
use cvitanok_core::TestApp;
use cvitanok_core::tasks::{
    TaskError, TaskQueue, TaskRegistry, TaskStatus, example_task, process_data_task,
    send_email_task,
};
use serde_json::json;

// ═══ Task bodies ═══

#[test]
fn test_example_task_adds() {
    assert_eq!(example_task(2, 3).unwrap(), 5);
    assert_eq!(example_task(-4, 4).unwrap(), 0);
}

#[test]
fn test_send_email_task() {
    let result = send_email_task("ada@example.com", "Hello", "Body");
    assert_eq!(result, json!({ "status": "sent", "email": "ada@example.com" }));
}

#[test]
fn test_process_data_task() {
    let result = process_data_task(json!({ "rows": [1, 2] }));
    assert_eq!(
        result,
        json!({ "status": "processed", "result": { "rows": [1, 2] } })
    );
}

// ═══ Queue ═══

fn queue() -> TaskQueue {
    TaskQueue::start(
        TaskRegistry::builtin(),
        CacheService::in_memory(),
        "redis://localhost:6379/1",
    )
}

#[tokio::test]
async fn test_enqueue_returns_immediately_and_completes() {
    let tasks = queue();
    let id = tasks.enqueue("example_task", json!([2, 3])).await.unwrap();

    let record = tasks.wait(&id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(record.status, TaskStatus::Success);
    assert_eq!(record.result, Some(json!(5)));
    assert_eq!(record.task_name, "example_task");
}

#[tokio::test]
async fn test_failed_task_records_error() {
    let tasks = queue();
    let id = tasks
        .enqueue("example_task", json!({ "x": "two" }))
        .await
        .unwrap();

    let record = tasks.wait(&id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(record.status, TaskStatus::Failure);
    assert!(record.error.unwrap().contains("example_task"));
}

#[tokio::test]
async fn test_unknown_task_and_id() {
    let tasks = queue();
    assert!(matches!(
        tasks.enqueue("nope", json!([])).await,
        Err(TaskError::UnknownTask(_))
    ));
    assert_eq!(tasks.status("missing").await.unwrap(), None);
    assert_eq!(tasks.broker_url(), "redis://localhost:6379/1");
}

#[tokio::test]
async fn test_overflowing_sum_fails_without_panicking() {
    let tasks = queue();
    let id = tasks
        .enqueue("example_task", json!([i64::MAX, 1]))
        .await
        .unwrap();

    let record = tasks.wait(&id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(record.status, TaskStatus::Failure);
    assert_eq!(record.result, None);
    let error = record.error.unwrap();
    assert!(error.contains("overflows"), "{error}");
    assert!(!error.contains("panicked"), "{error}");
}

// ═══ HTTP ═══

#[tokio::test]
async fn test_enqueue_over_http() {
    let app = TestApp::new().await;
    let token = app.create_user("worker@example.com", "long-password").await;

    let res = app
        .client
        .post_with_auth(
            &app.url("/api/v1/tasks/example_task"),
            &token,
            &json!({ "x": 2, "y": 3 }).to_string(),
        )
        .await;
    assert_eq!(res.status, 202, "{}", res.body);
    let task_id = res.json()["task_id"].as_str().unwrap().to_string();

    let mut record = serde_json::Value::Null;
    for _ in 0..200 {
        record = app
            .client
            .get(&app.url(&format!("/api/v1/tasks/{task_id}")))
            .await
            .json();
        if record["status"] == "SUCCESS" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(record["status"], "SUCCESS");
    assert_eq!(record["result"], 5);
}

#[tokio::test]
async fn test_enqueue_requires_active_user() {
    let app = TestApp::new().await;
    let res = app
        .client
        .post(&app.url("/api/v1/tasks/example_task"), "[2, 3]")
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_unknown_task_over_http() {
    let app = TestApp::new().await;
    let token = app.create_user("worker@example.com", "long-password").await;

    let res = app
        .client
        .post_with_auth(&app.url("/api/v1/tasks/nope"), &token, "[]")
        .await;
    assert_eq!(res.status, 404);
    assert_eq!(res.error()["code"], "UNKNOWN_TASK");

    let res = app.client.get(&app.url("/api/v1/tasks/not-an-id")).await;
    assert_eq!(res.status, 404);
    assert_eq!(res.error()["code"], "TASK_NOT_FOUND");
}
