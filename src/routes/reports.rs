use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppResult;
use crate::export::{self, ExportFormat};
use crate::pipeline::{Report, ReportRequest, generate_report};

pub async fn create_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> AppResult<Json<Report>> {
    let report = generate_report(&state.llm_client, &request).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ExportBody {
    pub report: Report,
    pub format: String,
}

pub async fn export_report(Json(body): Json<ExportBody>) -> AppResult<Response> {
    let format: ExportFormat = body.format.parse()?;
    let artifact = export::export(&body.report, format)?;

    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}
