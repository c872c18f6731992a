//! Background tasks.
//!
//! Tasks are plain functions from JSON arguments to a JSON result. They share
//! nothing with the request path: a handler enqueues a task by name and gets
//! a task id back immediately, the in-process worker runs the task on the
//! blocking pool, and the outcome lands in the result backend where
//! `GET /api/v1/tasks/{id}` can read it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::cache::CacheService;

/// Key prefix of task records in the result backend.
pub const RESULT_PREFIX: &str = "cvitanok-task-meta";

/// How long finished task records are kept.
const RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unknown task `{0}`")]
    UnknownTask(String),

    #[error("invalid arguments for `{task}`: {reason}")]
    InvalidArguments { task: String, reason: String },

    #[error("task `{0}` not found")]
    NotFound(String),

    #[error("task queue is not running")]
    QueueClosed,

    #[error("result backend error: {0}")]
    Backend(String),
}

impl TaskError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TaskError::UnknownTask(_) | TaskError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskError::InvalidArguments { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TaskError::QueueClosed | TaskError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            TaskError::UnknownTask(_) => "UNKNOWN_TASK",
            TaskError::InvalidArguments { .. } => "INVALID_TASK_ARGUMENTS",
            TaskError::NotFound(_) => "TASK_NOT_FOUND",
            TaskError::QueueClosed => "TASK_QUEUE_CLOSED",
            TaskError::Backend(_) => "TASK_BACKEND_ERROR",
        }
    }
}

// ── Task bodies ──

/// Adds two numbers. A sum outside the `i64` range is rejected.
pub fn example_task(x: i64, y: i64) -> Result<i64, TaskError> {
    x.checked_add(y).ok_or_else(|| TaskError::InvalidArguments {
        task: "example_task".to_string(),
        reason: format!("{x} + {y} overflows a 64-bit integer"),
    })
}

/// Pretends to send an email.
pub fn send_email_task(email: &str, subject: &str, body: &str) -> Value {
    tracing::info!(%email, %subject, body_len = body.len(), "sending email");
    json!({ "status": "sent", "email": email })
}

/// Echoes `data` back as processed.
pub fn process_data_task(data: Value) -> Value {
    tracing::info!(%data, "processing data");
    json!({ "status": "processed", "result": data })
}

// Arguments arrive either as an object (`{"x": 2, "y": 3}`) or positionally
// (`[2, 3]`); derived `Deserialize` accepts both.

#[derive(Deserialize)]
struct ExampleArgs {
    x: i64,
    y: i64,
}

#[derive(Deserialize)]
struct SendEmailArgs {
    email: String,
    subject: String,
    body: String,
}

#[derive(Deserialize)]
struct ProcessDataArgs {
    data: Value,
}

fn args<T: serde::de::DeserializeOwned>(task: &str, args: Value) -> Result<T, TaskError> {
    serde_json::from_value(args).map_err(|e| TaskError::InvalidArguments {
        task: task.to_string(),
        reason: e.to_string(),
    })
}

/// A task entry point: JSON arguments in, JSON result out.
pub type TaskFn = fn(Value) -> Result<Value, TaskError>;

/// Named tasks the worker can run.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<&'static str, TaskFn>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tasks shipped with the template.
    pub fn builtin() -> Self {
        let mut registry = TaskRegistry::new();
        registry
            .register("example_task", |raw| {
                let a: ExampleArgs = args("example_task", raw)?;
                Ok(json!(example_task(a.x, a.y)?))
            })
            .register("send_email_task", |raw| {
                let a: SendEmailArgs = args("send_email_task", raw)?;
                Ok(send_email_task(&a.email, &a.subject, &a.body))
            })
            .register("process_data_task", |raw| {
                let a: ProcessDataArgs = args("process_data_task", raw)?;
                Ok(process_data_task(a.data))
            });
        registry
    }

    pub fn register(&mut self, name: &'static str, task: TaskFn) -> &mut Self {
        self.tasks.insert(name, task);
        self
    }

    pub fn get(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).copied()
    }

    /// Registered task names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tasks.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run a task synchronously on the calling thread.
    pub fn call(&self, name: &str, raw: Value) -> Result<Value, TaskError> {
        let task = self
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        task(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Success,
    Failure,
}

/// What the result backend stores per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskRecord {
    pub task_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Job {
    id: String,
    name: String,
    task: TaskFn,
    args: Value,
}

/// Fire-and-forget task queue with an in-process worker.
#[derive(Clone)]
pub struct TaskQueue {
    registry: Arc<TaskRegistry>,
    sender: mpsc::UnboundedSender<Job>,
    results: CacheService,
    broker_url: Arc<str>,
}

impl TaskQueue {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn start(registry: TaskRegistry, results: CacheService, broker_url: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let results = results.with_prefix(RESULT_PREFIX);
        tokio::spawn(worker(receiver, results.clone()));
        tracing::info!(tasks = ?registry.names(), broker = %broker_url, "task worker started");
        TaskQueue {
            registry: Arc::new(registry),
            sender,
            results,
            broker_url: Arc::from(broker_url),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    /// Queue `name` with `args` and return its id without waiting.
    pub async fn enqueue(&self, name: &str, args: Value) -> Result<String, TaskError> {
        let task = self
            .registry
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        let id = uuid::Uuid::new_v4().to_string();

        store(
            &self.results,
            &TaskRecord {
                task_id: id.clone(),
                task_name: name.to_string(),
                status: TaskStatus::Pending,
                result: None,
                error: None,
            },
        )
        .await?;

        self.sender
            .send(Job {
                id: id.clone(),
                name: name.to_string(),
                task,
                args,
            })
            .map_err(|_| TaskError::QueueClosed)?;
        tracing::debug!(task = %name, task_id = %id, "task queued");
        Ok(id)
    }

    /// Current record of a task, `None` if the id is unknown or expired.
    pub async fn status(&self, id: &str) -> Result<Option<TaskRecord>, TaskError> {
        self.results
            .get_json(id)
            .await
            .map_err(|e| TaskError::Backend(e.to_string()))
    }

    /// Poll until the task finishes or `timeout` elapses.
    pub async fn wait(&self, id: &str, timeout: Duration) -> Result<TaskRecord, TaskError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.status(id).await? {
                Some(record)
                    if matches!(record.status, TaskStatus::Success | TaskStatus::Failure) =>
                {
                    return Ok(record);
                }
                Some(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                _ => return Err(TaskError::NotFound(id.to_string())),
            }
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("tasks", &self.registry.names())
            .field("broker_url", &self.broker_url)
            .finish()
    }
}

async fn store(results: &CacheService, record: &TaskRecord) -> Result<(), TaskError> {
    results
        .set_json(&record.task_id, record, Some(RESULT_TTL))
        .await
        .map_err(|e| TaskError::Backend(e.to_string()))
}

async fn worker(mut receiver: mpsc::UnboundedReceiver<Job>, results: CacheService) {
    while let Some(job) = receiver.recv().await {
        tokio::spawn(run_job(job, results.clone()));
    }
    tracing::debug!("task worker stopped");
}

async fn run_job(job: Job, results: CacheService) {
    let Job { id, name, task, args } = job;
    let mut record = TaskRecord {
        task_id: id,
        task_name: name,
        status: TaskStatus::Started,
        result: None,
        error: None,
    };
    if let Err(e) = store(&results, &record).await {
        tracing::warn!(task_id = %record.task_id, error = %e, "could not record task start");
    }

    match tokio::task::spawn_blocking(move || task(args)).await {
        Ok(Ok(value)) => {
            record.status = TaskStatus::Success;
            record.result = Some(value);
        }
        Ok(Err(e)) => {
            record.status = TaskStatus::Failure;
            record.error = Some(e.to_string());
        }
        Err(e) => {
            record.status = TaskStatus::Failure;
            record.error = Some(format!("task panicked: {e}"));
        }
    }

    match record.status {
        TaskStatus::Success => {
            tracing::info!(task = %record.task_name, task_id = %record.task_id, "task succeeded")
        }
        _ => tracing::error!(
            task = %record.task_name,
            task_id = %record.task_id,
            error = record.error.as_deref().unwrap_or_default(),
            "task failed"
        ),
    }
    if let Err(e) = store(&results, &record).await {
        tracing::error!(task_id = %record.task_id, error = %e, "could not record task result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_and_named_arguments() {
        let registry = TaskRegistry::builtin();
        assert_eq!(registry.call("example_task", json!([2, 3])).unwrap(), json!(5));
        assert_eq!(
            registry.call("example_task", json!({"x": 2, "y": 3})).unwrap(),
            json!(5)
        );
    }

    #[test]
    fn overflowing_sum_is_rejected() {
        assert!(matches!(
            example_task(i64::MAX, 1),
            Err(TaskError::InvalidArguments { .. })
        ));
        assert!(matches!(
            TaskRegistry::builtin().call("example_task", json!([i64::MIN, -1])),
            Err(TaskError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn bad_arguments_and_unknown_tasks() {
        let registry = TaskRegistry::builtin();
        assert!(matches!(
            registry.call("example_task", json!({"x": "two"})),
            Err(TaskError::InvalidArguments { .. })
        ));
        assert!(matches!(
            registry.call("nope", json!([])),
            Err(TaskError::UnknownTask(_))
        ));
    }
}
