//! Authentication API endpoints
//!
//! Handles HTTP requests for accounts and tokens:
//! - POST /api/auth/signup - Employee signup, returns the first PIN
//! - POST /api/auth/login - Login with a PIN or with email and password
//! - POST /api/auth/logout - Revoke the current token
//! - GET /api/auth/me - Get current user
//! - POST /api/auth/regenerate-pin - Issue a fresh PIN

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{json_body, Success, UserIdRequest};
use crate::api::middleware::{extract_token, ApiError, AppState, AuthenticatedUser, ClientIp};
use crate::models::{CreateUserInput, User};
use crate::services::{Clock, UserServiceError};

/// Request body for signup
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login. Either `pin`, or `email` with `password`.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub pin: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

enum Credentials {
    Pin(String),
    Password { email: String, password: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    #[serde(with = "crate::models::id_string")]
    pub user_id: i64,
    pub pin: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinResponse {
    pub pin: String,
    pub pin_created_at: DateTime<Utc>,
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/regenerate-pin", post(regenerate_pin))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

/// POST /api/auth/signup
async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;
    let registered = state
        .user_service
        .signup(CreateUserInput {
            username: body.username,
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(Success::json(SignupResponse {
        user_id: registered.user.id,
        pin: registered.pin,
    }))
}

/// POST /api/auth/login
///
/// Throttled per client IP and per identifier; failures count toward a
/// lockout, success clears it.
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;
    let limiter = &state.rate_limiter;
    let now = state.clock.now();

    if let Some(ip) = ip {
        if !limiter.allow_request(ip, now).await {
            tracing::warn!(%ip, "Login rate limit exceeded");
            return Err(ApiError::rate_limited("Too many requests, try again later"));
        }
    }

    let credentials = match (body.pin, body.email) {
        (Some(pin), _) => Credentials::Pin(pin),
        (None, Some(email)) => Credentials::Password {
            email,
            password: body.password.unwrap_or_default(),
        },
        (None, None) => {
            return Err(ApiError::validation_error(
                "Provide a PIN, or an email and password",
            ))
        }
    };

    // PIN failures are counted per client address
    let identifier = match (&credentials, ip) {
        (Credentials::Pin(_), Some(ip)) => format!("pin@{}", ip),
        (Credentials::Pin(_), None) => "pin".to_string(),
        (Credentials::Password { email, .. }, _) => email.trim().to_lowercase(),
    };

    if limiter.is_locked(&identifier, now).await {
        tracing::warn!(identifier = %identifier, "Login locked out");
        return Err(ApiError::rate_limited(
            "Too many failed attempts, try again later",
        ));
    }

    let result = match credentials {
        Credentials::Pin(pin) => state.user_service.login_with_pin(&pin).await,
        Credentials::Password { email, password } => {
            state
                .user_service
                .login_with_password(&email, &password)
                .await
        }
    };

    let logged_in = match result {
        Ok(logged_in) => logged_in,
        Err(
            e @ (UserServiceError::InvalidPin
            | UserServiceError::PinExpired
            | UserServiceError::InvalidCredentials),
        ) => {
            limiter.record_failure(&identifier, now).await;
            tracing::info!(identifier = %identifier, reason = %e, "Login failed");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    limiter.clear(&identifier).await;

    // Cookie for browser clients, token in the body for everyone else
    let max_age = (logged_in.token.expires_at - logged_in.token.created_at).num_seconds();
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        logged_in.token.id, max_age
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(ApiError::internal)?,
    );

    Ok((
        headers,
        Json(AuthResponse {
            user: logged_in.user,
            token: logged_in.token.id,
            expires_at: logged_in.token.expires_at,
        }),
    ))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

/// POST /api/auth/regenerate-pin - `{ userId }`, self or admin
async fn regenerate_pin(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<UserIdRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;
    user.ensure_can_act_for(body.user_id)?;

    let (pin, pin_created_at) = state.user_service.regenerate_pin(body.user_id).await?;

    Ok(Success::json(PinResponse {
        pin,
        pin_created_at,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use crate::config::Config;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use chrono::Duration;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_signup_then_login_with_password() {
        let app = TestApp::new().await;
        let amy = app.employee("amy").await;
        assert_eq!(amy.pin.len(), 4);

        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "AMY@example.com", "password": "hunter22" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["user"]["id"], amy.id.to_string());
        assert_eq!(body["user"]["role"], "user");
        assert!(body["user"].get("passwordHash").is_none());
        assert!(response.header("set-cookie").to_str().unwrap().starts_with("session="));
    }

    #[tokio::test]
    async fn test_signup_duplicate_is_rejected() {
        let app = TestApp::new().await;
        app.employee("amy").await;

        let response = app
            .server
            .post("/api/auth/signup")
            .json(&json!({ "username": "amy", "email": "other@example.com", "password": "x" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["error"],
            "That email/username is already taken"
        );
    }

    #[tokio::test]
    async fn test_login_failures() {
        let app = TestApp::new().await;
        let amy = app.employee("amy").await;

        let wrong_pin = if amy.pin == "1000" { "1001" } else { "1000" };
        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "pin": wrong_pin }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"], "Invalid PIN");

        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "amy@example.com", "password": "nope" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"], "Invalid credentials");

        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "amy@example.com" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        app.server
            .post("/api/auth/login")
            .json(&json!({}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_expired_pin_and_regeneration() {
        let app = TestApp::new().await;
        let amy = app.employee("amy").await;

        app.clock.advance(Duration::days(8));
        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "pin": amy.pin }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"], "PIN expired");

        // amy's token has expired as well
        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "amy@example.com", "password": "hunter22" }))
            .await;
        let token = response.json::<Value>()["token"].as_str().unwrap().to_string();

        let response = app
            .server
            .post("/api/auth/regenerate-pin")
            .authorization_bearer(&token)
            .json(&json!({ "userId": amy.id }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        let pin = body["pin"].as_str().unwrap();

        app.login_pin(pin).await;
    }

    #[tokio::test]
    async fn test_regenerate_pin_for_others_needs_admin() {
        let app = TestApp::new().await;
        let amy = app.employee("amy").await;
        let ben = app.employee("ben").await;
        let boss = app.admin("boss").await;

        app.server
            .post("/api/auth/regenerate-pin")
            .authorization_bearer(&amy.token)
            .json(&json!({ "userId": ben.id }))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        app.server
            .post("/api/auth/regenerate-pin")
            .authorization_bearer(&boss.token)
            .json(&json!({ "userId": ben.id }))
            .await
            .assert_status_ok();

        app.server
            .post("/api/auth/regenerate-pin")
            .authorization_bearer(&boss.token)
            .json(&json!({ "userId": 4242 }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let app = TestApp::new().await;
        let amy = app.employee("amy").await;

        app.server
            .get("/api/auth/me")
            .authorization_bearer(&amy.token)
            .await
            .assert_status_ok();

        app.server
            .post("/api/auth/logout")
            .authorization_bearer(&amy.token)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        app.server
            .get("/api/auth/me")
            .authorization_bearer(&amy.token)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_repeated_failures_lock_out() {
        let mut config = Config::default();
        config.auth.max_failed_attempts = 2;
        let app = TestApp::with_config(config).await;
        app.employee("amy").await;

        for _ in 0..2 {
            app.server
                .post("/api/auth/login")
                .json(&json!({ "email": "amy@example.com", "password": "bad" }))
                .await
                .assert_status(StatusCode::UNAUTHORIZED);
        }

        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "amy@example.com", "password": "hunter22" }))
            .await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.json::<Value>()["code"], "RATE_LIMIT");

        app.clock.advance(Duration::minutes(16));
        app.server
            .post("/api/auth/login")
            .json(&json!({ "email": "amy@example.com", "password": "hunter22" }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_per_ip_request_limit() {
        let mut config = Config::default();
        config.auth.max_requests_per_minute = 2;
        let app = TestApp::with_config(config).await;

        let forwarded = HeaderName::from_static("x-forwarded-for");
        for _ in 0..2 {
            app.server
                .post("/api/auth/login")
                .add_header(forwarded.clone(), HeaderValue::from_static("203.0.113.7"))
                .json(&json!({ "pin": "0000" }))
                .await
                .assert_status(StatusCode::UNAUTHORIZED);
        }

        app.server
            .post("/api/auth/login")
            .add_header(forwarded.clone(), HeaderValue::from_static("203.0.113.7"))
            .json(&json!({ "pin": "0000" }))
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);

        // Another client is unaffected
        app.server
            .post("/api/auth/login")
            .add_header(forwarded, HeaderValue::from_static("203.0.113.8"))
            .json(&json!({ "pin": "0000" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
}
