//! Common API utilities and shared types

use axum::{extract::rejection::JsonRejection, Json};
use serde::{Deserialize, Serialize};

use crate::api::middleware::ApiError;

/// Wraps a response body as `{ "success": true, ...body }`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

impl<T: Serialize> Success<T> {
    pub fn json(body: T) -> Json<Self> {
        Json(Self {
            success: true,
            body,
        })
    }
}

/// Body naming the user an operation targets
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdRequest {
    #[serde(with = "crate::models::id_string")]
    pub user_id: i64,
}

/// Unwrap a JSON body, turning malformed input into a 400 `ApiError`
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_flattens_body() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Created {
            task_id: String,
        }

        let Json(wrapped) = Success::json(Created {
            task_id: "7".to_string(),
        });
        assert_eq!(
            serde_json::to_value(wrapped).unwrap(),
            json!({"success": true, "taskId": "7"})
        );
    }

    #[test]
    fn test_user_id_accepts_string_or_number() {
        let a: UserIdRequest = serde_json::from_value(json!({"userId": "12"})).unwrap();
        let b: UserIdRequest = serde_json::from_value(json!({"userId": 12})).unwrap();
        assert_eq!(a.user_id, 12);
        assert_eq!(b.user_id, 12);
        assert!(serde_json::from_value::<UserIdRequest>(json!({})).is_err());
    }
}
