//! 任务接口 `/api/v1/tasks`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::core::{TaskError, TaskFilter, TaskStatus, TaskView};

const DEFAULT_LIST_LIMIT: usize = 50;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/tasks", get(list_tasks).post(create_task))
        .route("/api/v1/tasks/:id", get(get_task).delete(delete_task))
        .route("/api/v1/tasks/:id/execute", post(execute_task))
        .route("/api/v1/tasks/:id/pause", post(pause_task))
        .route("/api/v1/tasks/:id/resume", post(resume_task))
        .route("/api/v1/tasks/:id/cancel", post(cancel_task))
        .route("/api/v1/tasks/:id/input", post(provide_input))
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    name: String,
    #[serde(default = "empty_object")]
    input_data: Value,
    user_id: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    user_id: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ProvideInputRequest {
    input_data: Value,
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, "Task not found".to_string())
}

fn map_task_error(err: TaskError) -> ApiError {
    match err {
        TaskError::NotFound(_) => not_found(),
        TaskError::AlreadyExecuting(_) => (StatusCode::CONFLICT, err.to_string()),
        TaskError::InvalidTransition { .. } | TaskError::Cancelled => (StatusCode::BAD_REQUEST, err.to_string()),
    }
}

fn ack(message: &str, task_id: &str) -> Json<Value> {
    Json(json!({ "message": message, "task_id": task_id }))
}

/// POST /api/v1/tasks：创建 PENDING 任务
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskView>, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name is required".to_string()));
    }
    let task = state
        .tasks
        .create(name, req.input_data, req.user_id, req.session_id)
        .await;
    Ok(Json(task.view()))
}

/// GET /api/v1/tasks/:id
async fn get_task(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Result<Json<TaskView>, ApiError> {
    let task = state.tasks.get(&task_id).await.map_err(map_task_error)?;
    Ok(Json(task.view()))
}

/// GET /api/v1/tasks?status=&user_id=&limit=
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            TaskStatus::parse(s).ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Invalid status: {}", s)))?,
        ),
        None => None,
    };
    let filter = TaskFilter {
        status,
        user_id: query.user_id,
    };
    let tasks: Vec<TaskView> = state
        .tasks
        .list(&filter)
        .await
        .iter()
        .take(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .map(|t| t.view())
        .collect();
    Ok(Json(json!({ "total": tasks.len(), "tasks": tasks })))
}

/// POST /api/v1/tasks/:id/execute：在后台按任务名对应的技能执行
async fn execute_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state.tasks.get(&task_id).await.map_err(map_task_error)?;
    if !matches!(task.status, TaskStatus::Pending | TaskStatus::Paused) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Cannot execute task in status: {}", task.status),
        ));
    }
    let executor = state
        .skills
        .resolve(&task.name)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let manager = state.tasks.clone();
    let id = task_id.clone();
    tokio::spawn(async move {
        if let Err(e) = manager.execute(&id, executor).await {
            tracing::warn!(task_id = %id, error = %e, "background execution rejected");
        }
    });

    Ok(Json(json!({
        "message": "Task execution started",
        "task_id": task_id,
        "websocket_url": format!("/ws/task/{}", task_id),
    })))
}

async fn pause_task(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Result<Json<Value>, ApiError> {
    if !state.tasks.pause(&task_id).await {
        return Err((StatusCode::BAD_REQUEST, "Cannot pause task (may not be running)".to_string()));
    }
    Ok(ack("Task paused", &task_id))
}

async fn resume_task(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Result<Json<Value>, ApiError> {
    if !state.tasks.resume(&task_id).await {
        return Err((StatusCode::BAD_REQUEST, "Cannot resume task (may not be paused)".to_string()));
    }
    Ok(ack("Task resumed", &task_id))
}

async fn cancel_task(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Result<Json<Value>, ApiError> {
    if !state.tasks.cancel(&task_id).await {
        return Err((
            StatusCode::BAD_REQUEST,
            "Cannot cancel task (may already be completed)".to_string(),
        ));
    }
    Ok(ack("Task cancelled", &task_id))
}

async fn provide_input(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(req): Json<ProvideInputRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state.tasks.provide_input(&task_id, req.input_data).await {
        return Err((
            StatusCode::BAD_REQUEST,
            "Cannot provide input (task may not be waiting for input)".to_string(),
        ));
    }
    Ok(ack("Input provided", &task_id))
}

/// DELETE /api/v1/tasks/:id：只能删除已终止的任务
async fn delete_task(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Result<Json<Value>, ApiError> {
    match state.tasks.delete(&task_id).await {
        Ok(_) => Ok(ack("Task deleted", &task_id)),
        Err(TaskError::InvalidTransition { .. }) => Err((
            StatusCode::BAD_REQUEST,
            "Can only delete completed, failed, or cancelled tasks".to_string(),
        )),
        Err(e) => Err(map_task_error(e)),
    }
}
