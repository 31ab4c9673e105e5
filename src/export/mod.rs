//! Report export.
//!
//! A [`Report`] is first flattened into a [`ReportDocument`], the logical
//! content every format shares (title, topic line, date line, paragraphs,
//! numbered sources). Each format then lays that document out through its own
//! [`Renderer`].

pub mod docx;
pub mod font;
pub mod pdf;
pub mod text;

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::Report;
use crate::telemetry::metrics::{EXPORT_BYTES, EXPORT_DURATION};

pub const REPORT_TITLE: &str = "Research Report";
pub const SOURCES_HEADING: &str = "Sources:";
pub const PARAGRAPH_DELIMITER: &str = "\n\n";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to render {format} export: {message}")]
    Render {
        format: &'static str,
        message: String,
    },
}

impl ExportError {
    pub fn render(format: &'static str, err: impl fmt::Display) -> Self {
        Self::Render {
            format,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
    #[serde(alias = "text")]
    Txt,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Pdf, ExportFormat::Docx, ExportFormat::Txt];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
        }
    }

    pub fn filename(self) -> &'static str {
        match self {
            Self::Pdf => "research_report.pdf",
            Self::Docx => "research_report.docx",
            Self::Txt => "research_report.txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Txt => "text/plain; charset=utf-8",
        }
    }

    pub fn renderer(self) -> &'static dyn Renderer {
        match self {
            Self::Pdf => &pdf::PdfRenderer,
            Self::Docx => &docx::DocxRenderer,
            Self::Txt => &text::TextRenderer,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "txt" | "text" => Ok(Self::Txt),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Logical content shared by all formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    pub title: String,
    pub topic_line: String,
    pub date_line: String,
    /// Body text exactly as generated.
    pub body: String,
    pub paragraphs: Vec<String>,
    pub source_lines: Vec<String>,
}

impl ReportDocument {
    pub fn from_report(report: &Report) -> Self {
        Self {
            title: REPORT_TITLE.to_string(),
            topic_line: format!("Topic: {}", report.topic()),
            date_line: format!("Generated: {}", report.generated_date()),
            body: report.body().to_string(),
            paragraphs: split_paragraphs(report.body()),
            // by position, never by the stored index
            source_lines: report
                .sources()
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, s.label))
                .collect(),
        }
    }
}

/// Splits on the blank-line delimiter. An empty body has no paragraphs;
/// otherwise joining the result with the delimiter gives back the body.
pub fn split_paragraphs(body: &str) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }
    body.split(PARAGRAPH_DELIMITER).map(str::to_string).collect()
}

pub trait Renderer: Send + Sync {
    fn render(&self, doc: &ReportDocument) -> Result<Vec<u8>, ExportError>;
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub filename: &'static str,
    pub content_type: &'static str,
}

#[tracing::instrument(
    name = "export report",
    skip(report),
    fields(report.id = %report.id(), export.format = %format, export.bytes)
)]
pub fn export(report: &Report, format: ExportFormat) -> Result<ExportArtifact, ExportError> {
    let start = Instant::now();
    let doc = ReportDocument::from_report(report);

    let bytes = format.renderer().render(&doc).inspect_err(|err| {
        tracing::error!(error = %err, "export rendering failed");
    })?;

    let format_kv = KeyValue::new("export.format", format.as_str());
    EXPORT_DURATION.record(start.elapsed().as_secs_f64(), &[format_kv.clone()]);
    EXPORT_BYTES.record(bytes.len() as f64, &[format_kv]);
    tracing::Span::current().record("export.bytes", bytes.len());

    Ok(ExportArtifact {
        format,
        bytes,
        filename: format.filename(),
        content_type: format.content_type(),
    })
}
