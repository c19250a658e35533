use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::template::TemplateError;
use crate::validation::ValidationReport;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ValidationReport>,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn hide_in_production(detail: String, generic: &str) -> String {
    if is_production() {
        generic.to_string()
    } else {
        detail
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::Template(e) => match e {
                TemplateError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                TemplateError::ValidationFailed(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED")
                }
                TemplateError::InvalidTemplate(_) => (StatusCode::BAD_REQUEST, "INVALID_TEMPLATE"),
                TemplateError::NotPublished(_) => (StatusCode::CONFLICT, "NOT_PUBLISHED"),
                TemplateError::Inactive(_) => (StatusCode::CONFLICT, "TEMPLATE_INACTIVE"),
                TemplateError::Unauthorized(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                TemplateError::Serialization(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
                TemplateError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let log_message = self.to_string();

        let (client_message, report) = match self {
            AppError::Config(_) => (
                hide_in_production(log_message.clone(), "Configuration error"),
                None,
            ),
            AppError::Internal(_) => (
                hide_in_production(log_message.clone(), "Internal server error"),
                None,
            ),
            AppError::Template(TemplateError::ValidationFailed(report)) => {
                (log_message.clone(), Some(report))
            }
            _ => (log_message.clone(), None),
        };

        // Always log the detailed error server-side
        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::warn!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
                report,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_template_errors_map_to_status() {
        let cases = vec![
            (AppError::from(TemplateError::template_not_found(Uuid::nil())), StatusCode::NOT_FOUND),
            (
                AppError::from(TemplateError::ValidationFailed(ValidationReport::new())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (AppError::from(TemplateError::NotPublished(Uuid::nil())), StatusCode::CONFLICT),
            (AppError::from(TemplateError::Inactive(Uuid::nil())), StatusCode::CONFLICT),
            (
                AppError::from(TemplateError::Conflict("changed".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::from(TemplateError::Unauthorized("nope".to_string())),
                StatusCode::FORBIDDEN,
            ),
            (AppError::BadRequest("bad".to_string()), StatusCode::BAD_REQUEST),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
