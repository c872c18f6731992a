use axum::{
    Router,
    extract::{
        Path,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::deps::{CurrentActiveUser, Tasks};
use crate::error::AppError;
use crate::extractors::{Inject, Json};
use crate::response::MessageResponse;
use crate::tasks::{TaskError, TaskRecord};

use super::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskQueued {
    pub task_id: String,
}

/// Routes mounted under the API prefix.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/protected", get(protected))
        .route("/ws", get(ws_handler))
        .route("/tasks/{task}", post(enqueue_task).get(task_status))
}

/// Health check.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "api"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Greets the authenticated user.
#[utoipa::path(
    get,
    path = "/api/v1/protected",
    responses(
        (status = 200, description = "Greeting", body = MessageResponse),
        (status = 401, description = "Missing, invalid or inactive token")
    ),
    security(("bearer_auth" = [])),
    tag = "api"
)]
pub async fn protected(deps: Inject<(CurrentActiveUser,)>) -> Result<Json<MessageResponse>, AppError> {
    deps.run(|(user,)| async move {
        Ok(Json(MessageResponse::new(format!("Hello {}!", user.email))))
    })
    .await
}

/// Echo websocket: every text frame is answered with `Message received: {text}`.
pub async fn ws_handler(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(echo)
}

async fn echo(mut socket: WebSocket) {
    while let Some(frame) = socket.recv().await {
        let reply = match frame {
            Ok(Message::Text(text)) => format!("Message received: {}", text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "websocket receive failed");
                break;
            }
        };
        if socket.send(Message::Text(reply.into())).await.is_err() {
            break;
        }
    }
    tracing::debug!("websocket client disconnected");
}

/// Queue a background task. The body holds the task's JSON arguments.
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{task}",
    params(("task" = String, Path, description = "Task name, e.g. example_task")),
    request_body = Value,
    responses(
        (status = 202, description = "Task queued", body = TaskQueued),
        (status = 404, description = "Unknown task")
    ),
    security(("bearer_auth" = [])),
    tag = "tasks"
)]
pub async fn enqueue_task(
    deps: Inject<(CurrentActiveUser, Tasks)>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> Result<(StatusCode, Json<TaskQueued>), AppError> {
    deps.run(|(user, tasks)| async move {
        let task_id = tasks.enqueue(&name, args).await?;
        tracing::info!(user_id = user.id, task = %name, %task_id, "task enqueued");
        Ok((StatusCode::ACCEPTED, Json(TaskQueued { task_id })))
    })
    .await
}

/// Status and result of a queued task.
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{task}",
    params(("task" = String, Path, description = "Task id returned when queueing")),
    responses(
        (status = 200, description = "Task record", body = TaskRecord),
        (status = 404, description = "Unknown task id")
    ),
    tag = "tasks"
)]
pub async fn task_status(
    deps: Inject<(Tasks,)>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskRecord>, AppError> {
    deps.run(|(tasks,)| async move {
        let record = tasks
            .status(&task_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;
        Ok(Json(record))
    })
    .await
}
