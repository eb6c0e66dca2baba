//! Time-entry API endpoint
//!
//! - POST /api/time-entries - `{ userId, action, page?, pageSize? }`
//!
//! Mutating actions answer `{ success: true, ... }`; queries answer their
//! payload as is. Callers act on their own `userId` unless they are admins.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{json_body, Success};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::TimeEntryAction;

/// Request body for a time-entry action
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntryRequest {
    #[serde(with = "crate::models::id_string")]
    pub user_id: i64,
    pub action: String,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/time-entries", post(handle_action))
}

/// POST /api/time-entries
async fn handle_action(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<TimeEntryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(payload)?;
    let action: TimeEntryAction = body.action.parse()?;
    user.ensure_can_act_for(body.user_id)?;

    if body.user_id != user.0.id && state.user_service.get_by_id(body.user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let service = &state.time_entry_service;
    let user_id = body.user_id;

    let response = match action {
        TimeEntryAction::ClockIn => Success::json(service.clock_in(user_id).await?).into_response(),
        TimeEntryAction::ClockOut => Success::json(service.clock_out(user_id).await?).into_response(),
        TimeEntryAction::StartBreak => {
            Success::json(service.start_break(user_id).await?).into_response()
        }
        TimeEntryAction::EndBreak => Success::json(service.end_break(user_id).await?).into_response(),
        TimeEntryAction::GetSessions => Json(
            service
                .sessions(user_id, body.page, body.page_size)
                .await?,
        )
        .into_response(),
        TimeEntryAction::GetMonthlyDuration => {
            Json(service.monthly_duration(user_id).await?).into_response()
        }
        TimeEntryAction::GetStatus => Json(service.status(user_id).await?).into_response(),
    };

    Ok(response)
}
