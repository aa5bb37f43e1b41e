use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::{ControlError, StoreError};

/// Request rejected before any work was done.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InvalidInput(pub String);

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<InvalidInput>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<ControlError>() {
            Some(ControlError::EnvironmentNotFound(_) | ControlError::NoHardware(_)) => {
                StatusCode::NOT_FOUND
            }
            Some(
                ControlError::StaleDevice { .. }
                | ControlError::Store(StoreError::AmbiguousSchedule { .. }),
            ) => StatusCode::CONFLICT,
            Some(ControlError::SensorUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), "Request failed");
        }
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
