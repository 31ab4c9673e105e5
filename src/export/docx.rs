//! Word export.

use std::io::Cursor;

use docx_rs::{BreakType, Docx, LineSpacing, Paragraph, Run, Style, StyleType};

use super::{ExportError, Renderer, ReportDocument, SOURCES_HEADING};

const TITLE_STYLE: &str = "Heading1";
const SECTION_STYLE: &str = "Heading2";
/// Half-points.
const TOPIC_SIZE: usize = 28;

pub struct DocxRenderer;

impl Renderer for DocxRenderer {
    fn render(&self, doc: &ReportDocument) -> Result<Vec<u8>, ExportError> {
        let mut docx = Docx::new()
            .add_style(
                Style::new(TITLE_STYLE, StyleType::Paragraph)
                    .name("Heading 1")
                    .size(32)
                    .bold(),
            )
            .add_style(
                Style::new(SECTION_STYLE, StyleType::Paragraph)
                    .name("Heading 2")
                    .size(26)
                    .bold(),
            )
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text(&doc.title))
                    .style(TITLE_STYLE)
                    .line_spacing(LineSpacing::new().after(200)),
            )
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text(&doc.topic_line).bold().size(TOPIC_SIZE))
                    .line_spacing(LineSpacing::new().after(200)),
            )
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text(&doc.date_line))
                    .line_spacing(LineSpacing::new().after(400)),
            );

        for paragraph in &doc.paragraphs {
            docx = docx.add_paragraph(
                text_paragraph(paragraph).line_spacing(LineSpacing::new().after(200)),
            );
        }

        docx = docx.add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(SOURCES_HEADING))
                .style(SECTION_STYLE)
                .line_spacing(LineSpacing::new().before(400).after(200)),
        );
        for line in &doc.source_lines {
            docx = docx.add_paragraph(
                text_paragraph(line).line_spacing(LineSpacing::new().after(100)),
            );
        }

        let mut buf = Cursor::new(Vec::new());
        docx.build()
            .pack(&mut buf)
            .map_err(|e| ExportError::render("docx", e))?;
        Ok(buf.into_inner())
    }
}

/// Single newlines inside a paragraph become line breaks.
fn text_paragraph(text: &str) -> Paragraph {
    let mut run = Run::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        if !line.is_empty() {
            run = run.add_text(line);
        }
    }
    Paragraph::new().add_run(run)
}
