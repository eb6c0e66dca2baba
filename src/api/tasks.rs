//! Task API endpoints
//!
//! Admin only:
//! - POST /api/tasks - Create and assign a task
//! - POST /api/tasks/update - Set a task's status
//! - GET /api/tasks/all - Every task
//!
//! Self or admin:
//! - POST /api/tasks/list - `{ userId }` in-progress tasks
//! - POST /api/tasks/past - `{ userId }` completed tasks
//! - POST /api/tasks/current - `{ userId }` latest in-progress task
//!
//! Assignee or admin:
//! - POST /api/tasks/complete - `{ taskId }`

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{json_body, Success, UserIdRequest};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateTaskInput, Task, TaskStatus};

/// Request body for task creation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub client: Option<String>,
    pub due_at: Option<String>,
    #[serde(default, with = "crate::models::id_string::vec")]
    pub assignees: Vec<i64>,
    #[serde(default)]
    pub high_priority: bool,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(with = "crate::models::id_string")]
    pub id: i64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    #[serde(with = "crate::models::id_string")]
    pub task_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    #[serde(with = "crate::models::id_string")]
    pub task_id: i64,
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task: Option<Task>,
}

/// Build admin task routes (requires admin middleware)
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/update", post(update_task))
        .route("/tasks/all", get(list_all_tasks))
}

/// Build task routes for any authenticated user
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/list", post(list_tasks))
        .route("/tasks/past", post(list_past_tasks))
        .route("/tasks/current", post(current_task))
        .route("/tasks/complete", post(complete_task))
}

/// Accepts RFC 3339, a `datetime-local` value (`2024-05-01T17:00`) or a
/// bare date, all read as UTC
fn parse_due_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// POST /api/tasks
async fn create_task(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;

    let due_at = match body.due_at.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            parse_due_at(raw)
                .ok_or_else(|| ApiError::validation_error(format!("Invalid dueAt: {}", raw)))?,
        ),
    };

    let input = CreateTaskInput {
        title: body.title,
        client: body.client,
        due_at,
        assignees: body.assignees,
        high_priority: body.high_priority,
        note: body.note,
    };
    let task = state.task_service.create(&admin.0, input).await?;

    Ok((
        StatusCode::CREATED,
        Success::json(TaskCreated { task_id: task.id }),
    ))
}

/// POST /api/tasks/list
async fn list_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<UserIdRequest>, JsonRejection>,
) -> Result<Json<TasksResponse>, ApiError> {
    let body = json_body(payload)?;
    user.ensure_can_act_for(body.user_id)?;

    let tasks = state.task_service.list_open(body.user_id).await?;
    Ok(Json(TasksResponse { tasks }))
}

/// POST /api/tasks/past
async fn list_past_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<UserIdRequest>, JsonRejection>,
) -> Result<Json<TasksResponse>, ApiError> {
    let body = json_body(payload)?;
    user.ensure_can_act_for(body.user_id)?;

    let tasks = state.task_service.list_past(body.user_id).await?;
    Ok(Json(TasksResponse { tasks }))
}

/// POST /api/tasks/current
async fn current_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<UserIdRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let body = json_body(payload)?;
    user.ensure_can_act_for(body.user_id)?;

    let task = state.task_service.current(body.user_id).await?;
    Ok(Json(TaskResponse { task }))
}

/// POST /api/tasks/update
async fn update_task(
    State(state): State<AppState>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;
    let status: TaskStatus = body
        .status
        .parse()
        .map_err(|_| ApiError::validation_error("Status must be in-progress or completed"))?;

    let task = state.task_service.update_status(body.id, status).await?;
    Ok(Success::json(TaskResponse { task: Some(task) }))
}

/// POST /api/tasks/complete
async fn complete_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CompleteTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;
    let task = state.task_service.complete(&user.0, body.task_id).await?;
    Ok(Success::json(TaskResponse { task: Some(task) }))
}

/// GET /api/tasks/all
async fn list_all_tasks(State(state): State<AppState>) -> Result<Json<TasksResponse>, ApiError> {
    let tasks = state.task_service.list_all().await?;
    Ok(Json(TasksResponse { tasks }))
}
