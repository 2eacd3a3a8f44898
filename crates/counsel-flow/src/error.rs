use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::automation::{AutomationError, StoreError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("automation error: {0}")]
    Automation(#[from] AutomationError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Automation(AutomationError::Validation { .. }) => StatusCode::BAD_REQUEST,
            AppError::Automation(AutomationError::Store(StoreError::NotFound)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Automation(AutomationError::Store(StoreError::Unavailable(_)))
            | AppError::Automation(AutomationError::Timeout { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Automation(_)
            | AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
