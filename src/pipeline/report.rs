use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display format for the generation date, shared by every export format.
pub const DATE_FORMAT: &str = "%-m/%-d/%Y";

/// One selected source as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceInput {
    /// URL or document name shown in the exported source list.
    pub label: String,
    /// Extracted text sent to the model.
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    /// 1-based position in the original selection.
    pub index: usize,
    pub label: String,
}

/// A generated report. Fields are private so a report cannot change after
/// generation; exports borrow it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    id: Uuid,
    topic: String,
    body: String,
    generated_at: DateTime<Utc>,
    sources: Vec<SourceRef>,
    #[serde(default)]
    skipped_sources: Vec<usize>,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

pub struct ReportParts<'a> {
    pub topic: &'a str,
    pub body: String,
    pub generated_at: DateTime<Utc>,
    pub source_labels: Vec<String>,
    pub skipped_sources: Vec<usize>,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Report {
    pub fn new(parts: ReportParts<'_>) -> Self {
        let sources = parts
            .source_labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| SourceRef {
                index: i + 1,
                label,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            topic: parts.topic.to_string(),
            body: parts.body,
            generated_at: parts.generated_at,
            sources,
            skipped_sources: parts.skipped_sources,
            provider: parts.provider,
            model: parts.model,
            input_tokens: parts.input_tokens,
            output_tokens: parts.output_tokens,
        }
    }

    /// Minimal report for callers that already hold the text, e.g. exports of
    /// previously generated reports.
    pub fn from_text(
        topic: &str,
        body: impl Into<String>,
        source_labels: Vec<String>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self::new(ReportParts {
            topic,
            body: body.into(),
            generated_at,
            source_labels,
            skipped_sources: Vec::new(),
            provider: String::new(),
            model: String::new(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn generated_date(&self) -> String {
        self.generated_at.format(DATE_FORMAT).to_string()
    }

    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    pub fn skipped_sources(&self) -> &[usize] {
        &self.skipped_sources
    }

    /// Sources whose text reached the prompt.
    pub fn usable_sources(&self) -> usize {
        self.sources.len().saturating_sub(self.skipped_sources.len())
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}
