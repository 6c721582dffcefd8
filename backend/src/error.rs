use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::protocol::{RUN_FAILED_MESSAGE, RUN_TIMEOUT_MESSAGE};
use shared::ErrorResponse;
use std::time::Duration;
use tracing::{error, warn};

use crate::db::StoreError;
use crate::openai::AssistantApiError;

/// Every failure an endpoint can report. Status codes are chosen only here.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing required fields: {}", .0.join(", "))]
    Validation(Vec<&'static str>),

    #[error("Invalid {0}")]
    InvalidField(&'static str),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("assistant API failure: {0}")]
    Upstream(String),

    #[error("storage failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("assistant run did not finish within {0:?}")]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,
}

impl From<AssistantApiError> for AppError {
    fn from(err: AssistantApiError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidField(_) | AppError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) | AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Validation(_)
            | AppError::InvalidField(_)
            | AppError::InvalidBody(_)
            | AppError::NotFound(_) => self.to_string(),
            AppError::Upstream(_) => {
                error!("{}", self);
                RUN_FAILED_MESSAGE.to_string()
            }
            AppError::Persistence(_) => {
                error!("{}", self);
                "Internal Server Error".to_string()
            }
            AppError::Timeout(_) => {
                warn!("{}", self);
                RUN_TIMEOUT_MESSAGE.to_string()
            }
            AppError::Cancelled => "Server is shutting down".to_string(),
        };

        (self.status(), Json(ErrorResponse { error: message })).into_response()
    }
}
