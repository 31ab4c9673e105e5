use chrono::Utc;
use opentelemetry::KeyValue;
use serde::Deserialize;

use crate::error::AppError;
use crate::llm::LlmClient;
use crate::telemetry::metrics::{
    REPORT_GENERATION_DURATION, REPORT_SOURCES, REPORT_SOURCES_SKIPPED,
};

use super::prompt::DEFAULT_INSTRUCTIONS;
use super::report::{Report, ReportParts, SourceInput};
use super::sanitize;

#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    pub query: String,
    #[serde(default)]
    pub instructions: Option<String>,
    pub sources: Vec<SourceInput>,
}

impl ReportRequest {
    pub fn instructions(&self) -> &str {
        match self.instructions.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => DEFAULT_INSTRUCTIONS,
        }
    }

    /// The query as a single line. Blank lines would otherwise split the
    /// topic header of the text export.
    pub fn topic(&self) -> String {
        self.query.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Rejects requests that would waste a provider call.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.query.trim().is_empty() {
            return Err(AppError::Validation("query must not be empty".into()));
        }
        if self.sources.is_empty() {
            return Err(AppError::Validation(
                "at least one source must be selected".into(),
            ));
        }
        Ok(())
    }
}

#[tracing::instrument(
    name = "pipeline report",
    skip(llm_client, request),
    fields(
        report.id,
        report.sources_count = request.sources.len(),
        report.sources_skipped,
        report.duration_ms,
    )
)]
pub async fn generate_report(
    llm_client: &LlmClient,
    request: &ReportRequest,
) -> Result<Report, AppError> {
    request.validate()?;
    let start = std::time::Instant::now();
    let span = tracing::Span::current();

    // Stage 1: sanitize, keeping selection positions
    let contents: Vec<&str> = request.sources.iter().map(|s| s.content.as_str()).collect();
    let sanitized = sanitize::sanitize(&contents);
    span.record("report.sources_skipped", sanitized.skipped_positions.len());

    if !sanitized.skipped_positions.is_empty() {
        tracing::warn!(
            skipped = ?sanitized.skipped_positions,
            "dropping sources whose text extraction failed"
        );
    }
    if sanitized.sources.is_empty() {
        return Err(AppError::Validation(
            "none of the selected sources contain extractable text".into(),
        ));
    }

    // Stage 2: compose + generate with retry
    let topic = request.topic();
    let resp = llm_client
        .generate_report(&topic, &sanitized.sources, request.instructions())
        .await?;

    // Stage 3: freeze into an immutable report
    let report = Report::new(ReportParts {
        topic: &topic,
        body: resp.content,
        generated_at: Utc::now(),
        source_labels: request.sources.iter().map(|s| s.label.clone()).collect(),
        skipped_sources: sanitized.skipped_positions,
        provider: resp.provider,
        model: resp.model,
        input_tokens: resp.input_tokens,
        output_tokens: resp.output_tokens,
    });

    let duration = start.elapsed();
    let provider_kv = KeyValue::new("gen_ai.provider.name", report.provider().to_string());
    REPORT_GENERATION_DURATION.record(duration.as_secs_f64(), &[provider_kv.clone()]);
    REPORT_SOURCES.record(report.usable_sources() as f64, &[provider_kv.clone()]);
    REPORT_SOURCES_SKIPPED.record(report.skipped_sources().len() as f64, &[provider_kv]);

    span.record("report.id", report.id().to_string());
    span.record(
        "report.duration_ms",
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
    );

    tracing::info!(
        report.id = %report.id(),
        tokens = report.total_tokens(),
        "report generated"
    );

    Ok(report)
}
