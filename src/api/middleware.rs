//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type every handler returns
//! - Bearer token authentication and the admin role check
//! - Extractors for the authenticated user and the client address

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        ConnectInfo, FromRequestParts, Request, State,
    },
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxAuthTokenRepository, SqlxTaskRepository, SqlxUserRepository, SqlxWorkSessionRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    DynClock, LoginRateLimiter, StatsService, TaskService, TaskServiceError, TimeEntryError,
    TimeEntryService, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub clock: DynClock,
    pub user_service: Arc<UserService>,
    pub time_entry_service: Arc<TimeEntryService>,
    pub task_service: Arc<TaskService>,
    pub stats_service: Arc<StatsService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    /// Wire every repository and service onto one pool and clock
    pub fn new(pool: DynDatabasePool, clock: DynClock, config: &Config) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxWorkSessionRepository::boxed(pool.clone());

        let user_service = Arc::new(UserService::new(
            user_repo.clone(),
            SqlxAuthTokenRepository::boxed(pool.clone()),
            session_repo.clone(),
            clock.clone(),
            config.auth.clone(),
        ));
        let time_entry_service = Arc::new(TimeEntryService::new(
            session_repo,
            clock.clone(),
            config.time_entries.clone(),
        ));
        let task_service = Arc::new(TaskService::new(
            SqlxTaskRepository::boxed(pool.clone()),
            user_repo,
            clock.clone(),
        ));
        let stats_service = Arc::new(StatsService::new(
            user_service.clone(),
            time_entry_service.clone(),
            task_service.clone(),
        ));

        Self {
            pool,
            clock,
            user_service,
            time_entry_service,
            task_service,
            stats_service,
            rate_limiter: Arc::new(LoginRateLimiter::new(&config.auth)),
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    /// Reject unless the caller is `user_id` or an admin
    pub fn ensure_can_act_for(&self, user_id: i64) -> Result<(), ApiError> {
        if self.0.can_act_for(user_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden("You can only act on your own account"))
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Best-effort client address: proxy headers first, then the socket peer
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = forwarded_ip(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        });
        Ok(ClientIp(ip))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|s| s.trim().parse().ok()) {
            return Some(ip);
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Error body for API errors: `{ "error": message, "code": CODE }`
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub message: String,
    pub code: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMIT", message)
    }

    /// Log the cause and answer with a generic message
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "Request failed");
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

impl From<TimeEntryError> for ApiError {
    fn from(err: TimeEntryError) -> Self {
        match err {
            TimeEntryError::NoActiveSession
            | TimeEntryError::NotOnBreak
            | TimeEntryError::InvalidAction => ApiError::validation_error(err.to_string()),
            TimeEntryError::ClockInConflict => ApiError::conflict(err.to_string()),
            TimeEntryError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::ValidationError(_) | UserServiceError::AlreadyTaken => {
                ApiError::validation_error(err.to_string())
            }
            UserServiceError::Conflict(msg) => ApiError::conflict(msg),
            UserServiceError::InvalidPin
            | UserServiceError::PinExpired
            | UserServiceError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::NotFound(msg) => ApiError::not_found(msg),
            UserServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<TaskServiceError> for ApiError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TaskServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            TaskServiceError::NotFound => ApiError::not_found(err.to_string()),
            TaskServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

/// Bearer token from the Authorization header, or the `session` cookie
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_str) = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    let cookie_str = headers.get(header::COOKIE).and_then(|h| h.to_str().ok())?;
    cookie_str
        .split(';')
        .find_map(|cookie| cookie.trim().strip_prefix("session="))
        .map(String::from)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_token(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware, layered inside [`require_auth`]
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::new("SOMETHING", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ApiError::not_found("Task not found")).unwrap();
        assert_eq!(body, serde_json::json!({"error": "Task not found", "code": "NOT_FOUND"}));
    }

    #[test]
    fn test_internal_errors_are_generic() {
        let err: ApiError = TimeEntryError::InternalError(anyhow::anyhow!("disk on fire")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn test_service_error_mapping() {
        let err: ApiError = TimeEntryError::NoActiveSession.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "No active session found");

        let err: ApiError = TimeEntryError::ClockInConflict.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError = UserServiceError::PinExpired.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "PIN expired");

        let err: ApiError = UserServiceError::AlreadyTaken.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = TaskServiceError::NotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_extract_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_client_ip_falls_back_to_peer_address() {
        use axum::{body::Body, routing::get, Router};
        use tower::ServiceExt;

        async fn echo(ClientIp(ip): ClientIp) -> String {
            ip.map(|ip| ip.to_string()).unwrap_or_default()
        }
        let app = Router::new().route("/", get(echo));

        let peer: SocketAddr = "198.51.100.4:50000".parse().unwrap();
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = app.clone().oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"198.51.100.4");

        let request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"203.0.113.1");
    }

    #[test]
    fn test_forwarded_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(forwarded_ip(&headers), "10.0.0.2".parse().ok());

        headers.insert("x-forwarded-for", HeaderValue::from_static("192.168.1.9, 10.0.0.1"));
        assert_eq!(forwarded_ip(&headers), "192.168.1.9".parse().ok());
    }
}
