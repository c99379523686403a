use crate::research::{ResearchError, ResearchReport, Verification};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============= API Request/Response Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResearchRequest {
    /// Free-text research question. Required; must not be blank.
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResearchResponse {
    pub report: ResearchReport,
    /// Same verification as inside `report`, surfaced for convenience
    pub verification: Verification,
}

impl From<ResearchReport> for ResearchResponse {
    fn from(report: ResearchReport) -> Self {
        let verification = report.verification().clone();
        Self {
            report,
            verification,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// ISO-8601, UTC
    pub timestamp: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Research(#[from] ResearchError),

    /// The body could not be read as a research request.
    #[error(transparent)]
    InvalidBody(#[from] JsonRejection),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Research(ResearchError::EmptyQuery)
            | AppError::Research(ResearchError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
            AppError::Research(ResearchError::ProcessExecution(_))
            | AppError::Research(ResearchError::MalformedReport(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::InvalidBody(rejection) => rejection.status(),
        }
    }

    /// Client-facing body. Process diagnostics never appear here.
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            AppError::Research(ResearchError::EmptyQuery) => {
                ErrorResponse::new(ResearchError::EmptyQuery.to_string())
            }
            AppError::Research(ResearchError::InvalidQuery(reason)) => {
                ErrorResponse::new("Invalid query").with_details(reason.clone())
            }
            AppError::Research(ResearchError::ProcessExecution(failure)) => {
                let body = ErrorResponse::new("Research pipeline execution failed");
                if failure.is_timeout() {
                    body.with_details(failure.to_string())
                } else {
                    body
                }
            }
            AppError::Research(ResearchError::MalformedReport(_)) => {
                ErrorResponse::new("Research pipeline returned an invalid report")
            }
            AppError::InvalidBody(rejection) => {
                let error = match rejection.status() {
                    StatusCode::PAYLOAD_TOO_LARGE => "Request body too large",
                    StatusCode::UNSUPPORTED_MEDIA_TYPE => "Expected a JSON request body",
                    _ => "Invalid request body",
                };
                ErrorResponse::new(error).with_details(rejection.body_text())
            }
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "request rejected: {}", self);
        }

        (status, axum::Json(self.to_error_response())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
