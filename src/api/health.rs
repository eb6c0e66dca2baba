//! Health check
//!
//! - GET /api/health - `{ connected: true }` when the database answers

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub connected: bool,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state
        .pool
        .ping()
        .await
        .map_err(|e| ApiError::internal(format!("Database ping failed: {:#}", e)))?;
    Ok(Json(HealthResponse { connected: true }))
}
