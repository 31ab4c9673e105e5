use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::export::ExportError;
use crate::llm::client::ExtractionError;
use crate::llm::retry::GenerationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Generation(e) if e.last_error().is_rate_limited() => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Generation(_) | AppError::Extraction(ExtractionError::Provider(_)) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Extraction(ExtractionError::InvalidPayload(_)) => StatusCode::BAD_REQUEST,
            AppError::Export(ExportError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            AppError::Export(ExportError::Render { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the user.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Database(_) => "Internal server error".to_string(),
            AppError::Generation(_) => "Failed to generate report. Please try again.".to_string(),
            AppError::Extraction(ExtractionError::InvalidPayload(msg)) => msg.clone(),
            AppError::Extraction(ExtractionError::Provider(_)) => {
                "Failed to extract text from document".to_string()
            }
            AppError::Export(ExportError::UnsupportedFormat(format)) => {
                format!("unsupported export format: {format}")
            }
            AppError::Export(ExportError::Render { .. }) => "Failed to export report".to_string(),
        }
    }
}

fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::Validation(_) | AppError::NotFound(_) => {}
            AppError::Generation(e) => {
                tracing::error!(error = %e, attempts = e.attempts(), "Report generation error");
            }
            other => {
                tracing::error!(error = %other, "Request failed");
            }
        }

        let error_message = self.public_message();
        let body = if let Some(trace_id) = get_trace_id() {
            json!({
                "error": error_message,
                "status": status.as_u16(),
                "trace_id": trace_id,
            })
        } else {
            json!({
                "error": error_message,
                "status": status.as_u16(),
            })
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
