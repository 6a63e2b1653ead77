use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use data_loader::UserId;
use models::ModelError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by the HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("n_recommendations must be between {min} and {max}, got {found}")]
    InvalidCount { found: i64, min: usize, max: usize },

    #[error("User {0} is not part of the model")]
    UnknownUser(UserId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::UnknownUser(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::UnknownUser(user_id) => ApiError::UnknownUser(user_id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
