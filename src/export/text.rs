//! Plain-text export, the reference serialization the other formats agree
//! with.

use super::{ExportError, PARAGRAPH_DELIMITER, Renderer, ReportDocument, SOURCES_HEADING};

pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn render(&self, doc: &ReportDocument) -> Result<Vec<u8>, ExportError> {
        Ok(render_string(doc).into_bytes())
    }
}

pub fn render_string(doc: &ReportDocument) -> String {
    let mut blocks: Vec<&str> = vec![
        &doc.title,
        &doc.topic_line,
        &doc.date_line,
        "",
        &doc.body,
        "",
        SOURCES_HEADING,
    ];
    blocks.extend(doc.source_lines.iter().map(String::as_str));
    blocks.join(PARAGRAPH_DELIMITER)
}

/// Fields recovered from a plain-text export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTextReport {
    pub topic: String,
    pub date: String,
    pub body: String,
    /// `(number, label)` in document order.
    pub sources: Vec<(usize, String)>,
}

/// Reads back a document produced by [`render_string`].
///
/// The body is located between the fixed header and the last
/// `"\n\n\n\nSources:"` marker, so it may itself contain blank lines or a
/// line reading "Sources:". The topic and source labels must not contain
/// the paragraph delimiter; reports built by the pipeline keep the topic on
/// one line.
pub fn parse(text: &str) -> Option<ParsedTextReport> {
    let rest = text.strip_prefix(super::REPORT_TITLE)?.strip_prefix(PARAGRAPH_DELIMITER)?;

    let (topic_line, rest) = rest.split_once(PARAGRAPH_DELIMITER)?;
    let topic = topic_line.strip_prefix("Topic: ")?;

    let (date_line, rest) = rest.split_once(PARAGRAPH_DELIMITER)?;
    let date = date_line.strip_prefix("Generated: ")?;

    // empty placeholder, then the body
    let rest = rest.strip_prefix(PARAGRAPH_DELIMITER)?;

    let marker = format!("{PARAGRAPH_DELIMITER}{PARAGRAPH_DELIMITER}{SOURCES_HEADING}");
    let marker_at = rest.rfind(&marker)?;
    let body = &rest[..marker_at];
    let tail = &rest[marker_at + marker.len()..];

    let mut sources = Vec::new();
    if !tail.is_empty() {
        let tail = tail.strip_prefix(PARAGRAPH_DELIMITER)?;
        for line in tail.split(PARAGRAPH_DELIMITER) {
            let (number, label) = line.split_once(". ")?;
            sources.push((number.parse().ok()?, label.to_string()));
        }
    }

    Some(ParsedTextReport {
        topic: topic.to_string(),
        date: date.to_string(),
        body: body.to_string(),
        sources,
    })
}
