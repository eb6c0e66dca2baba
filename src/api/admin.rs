//! Admin API endpoints
//!
//! All routes require the admin role:
//! - GET /api/admin/employees - Employees with their clock status
//! - PUT /api/admin/employees/{id} - Rename an employee
//! - DELETE /api/admin/employees/{id} - Delete an employee and their history
//! - POST /api/admin/admins - Create another admin
//! - GET /api/admin/stats - Dashboard counters

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{json_body, Success};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::CreateUserInput;
use crate::services::{AdminStats, EmployeeView};

#[derive(Debug, Serialize)]
pub struct EmployeesResponse {
    pub employees: Vec<EmployeeView>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreated {
    #[serde(with = "crate::models::id_string")]
    pub admin_id: i64,
    pub pin: String,
}

/// Nothing to report beyond `success`
#[derive(Debug, Serialize)]
pub struct Done {}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/employees", get(list_employees))
        .route("/employees/{id}", put(rename_employee).delete(delete_employee))
        .route("/admins", post(create_admin))
        .route("/stats", get(get_stats))
}

/// GET /api/admin/employees
async fn list_employees(State(state): State<AppState>) -> Result<Json<EmployeesResponse>, ApiError> {
    let employees = state.user_service.list_employees().await?;
    Ok(Json(EmployeesResponse { employees }))
}

/// PUT /api/admin/employees/{id}
async fn rename_employee(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let body = json_body(payload)?;

    state.user_service.rename_employee(id, &body.username).await?;
    Ok(Success::json(Done {}))
}

/// DELETE /api/admin/employees/{id}
async fn delete_employee(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    if id == admin.0.id {
        return Err(ApiError::validation_error("You cannot delete your own account"));
    }

    state.user_service.delete_employee(id).await?;
    Ok(Success::json(Done {}))
}

/// POST /api/admin/admins
async fn create_admin(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    payload: Result<Json<CreateAdminRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;
    let registered = state
        .user_service
        .create_admin(
            &admin.0,
            CreateUserInput {
                username: body.username,
                email: body.email,
                password: body.password,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Success::json(AdminCreated {
            admin_id: registered.user.id,
            pin: registered.pin,
        }),
    ))
}

/// GET /api/admin/stats
async fn get_stats(State(state): State<AppState>) -> Result<Json<AdminStats>, ApiError> {
    let stats = state
        .stats_service
        .snapshot()
        .await
        .map_err(|e| ApiError::internal(format!("{:#}", e)))?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_list_employees_with_status() {
        let app = TestApp::new().await;
        let boss = app.admin("boss").await;
        let amy = app.employee("amy").await;
        let ben = app.employee("ben").await;
        app.action(&amy, "clock-in").await.assert_status_ok();
        app.action(&ben, "clock-in").await.assert_status_ok();
        app.action(&ben, "start-break").await.assert_status_ok();

        let response = app
            .server
            .get("/api/admin/employees")
            .authorization_bearer(&boss.token)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        let employees = body["employees"].as_array().unwrap();
        assert_eq!(employees.len(), 2);

        let status_of = |id: i64| {
            employees
                .iter()
                .find(|e| e["id"] == id.to_string())
                .map(|e| e["status"].as_str().unwrap().to_string())
                .unwrap()
        };
        assert_eq!(status_of(amy.id), "active");
        assert_eq!(status_of(ben.id), "on-break");

        app.action(&amy, "clock-out").await.assert_status_ok();
        let body: Value = app
            .server
            .get("/api/admin/employees")
            .authorization_bearer(&boss.token)
            .await
            .json();
        assert!(body["employees"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["username"] == "amy" && e["status"] == "off"));
    }

    #[tokio::test]
    async fn test_rename_and_delete_employee() {
        let app = TestApp::new().await;
        let boss = app.admin("boss").await;
        let amy = app.employee("amy").await;
        app.action(&amy, "clock-in").await.assert_status_ok();

        let path = format!("/api/admin/employees/{}", amy.id);
        app.server
            .put(&path)
            .authorization_bearer(&boss.token)
            .json(&json!({ "username": "  amelia " }))
            .await
            .assert_status_ok();

        let me: Value = app
            .server
            .get("/api/auth/me")
            .authorization_bearer(&amy.token)
            .await
            .json();
        assert_eq!(me["username"], "amelia");

        app.server
            .put(&path)
            .authorization_bearer(&boss.token)
            .json(&json!({ "username": "   " }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        app.server
            .put("/api/admin/employees/9999")
            .authorization_bearer(&boss.token)
            .json(&json!({ "username": "ghost" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let response = app.server.delete(&path).authorization_bearer(&boss.token).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["success"], true);

        // Token went with the account
        app.server
            .get("/api/auth/me")
            .authorization_bearer(&amy.token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        app.server
            .delete(&path)
            .authorization_bearer(&boss.token)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        app.server
            .delete("/api/admin/employees/not-a-number")
            .authorization_bearer(&boss.token)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_admin() {
        let app = TestApp::new().await;
        let boss = app.admin("boss").await;

        let request = json!({
            "username": "deputy",
            "email": "deputy@example.com",
            "password": "hunter22",
        });
        let response = app
            .server
            .post("/api/admin/admins")
            .authorization_bearer(&boss.token)
            .json(&request)
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert!(body["adminId"].is_string());

        let token = app.login_pin(body["pin"].as_str().unwrap()).await;
        let me: Value = app
            .server
            .get("/api/auth/me")
            .authorization_bearer(&token)
            .await
            .json();
        assert_eq!(me["role"], "admin");

        app.server
            .post("/api/admin/admins")
            .authorization_bearer(&boss.token)
            .json(&request)
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_stats() {
        let app = TestApp::new().await;
        let boss = app.admin("boss").await;
        let amy = app.employee("amy").await;
        app.action(&amy, "clock-in").await.assert_status_ok();

        let response = app
            .server
            .get("/api/admin/stats")
            .authorization_bearer(&boss.token)
            .await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({
                "employees": 1,
                "activeNow": 1,
                "onBreakNow": 0,
                "tasksInProgress": 0,
                "tasksCompleted": 0,
                "monthNetDuration": 0,
            })
        );
    }
}
