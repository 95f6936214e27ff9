//! Error responses for the management API

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;

/// Handler error carrying an agent [`Error`]
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<String>,
}

impl ApiError {
    /// Status code for the wrapped error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_user_error() => StatusCode::BAD_REQUEST,
            Error::AlreadyConfigured(_) => StatusCode::CONFLICT,
            Error::NotRegistered => StatusCode::FAILED_DEPENDENCY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(stage = self.0.stage(), error = %self.0, "request failed");
        } else {
            tracing::debug!(stage = self.0.stage(), error = %self.0, "request rejected");
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            stage: self.0.stage(),
            input: self.0.input().map(ToString::to_string),
        };

        (status, Json(body)).into_response()
    }
}
