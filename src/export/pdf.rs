//! Paginated PDF export.
//!
//! Layout happens in millimetres with a top-left origin, the way the page is
//! described to users. [`layout`] produces a [`PdfLayout`] that tests can
//! inspect; [`PdfRenderer`] then encodes it with lopdf, flipping the y axis
//! into PDF user space.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use super::font::{text_width_mm, wrap};
use super::{ExportError, Renderer, ReportDocument, SOURCES_HEADING};

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 20.0;
pub const CONTENT_WIDTH_MM: f32 = PAGE_WIDTH_MM - MARGIN_MM * 2.0;
/// A paragraph or source starting below this line moves to a new page.
pub const BOTTOM_THRESHOLD_MM: f32 = 270.0;
/// No single line is placed below the bottom margin.
pub const LAST_LINE_MM: f32 = PAGE_HEIGHT_MM - MARGIN_MM;

const TITLE_SIZE: f32 = 18.0;
const TOPIC_SIZE: f32 = 14.0;
const DATE_SIZE: f32 = 12.0;
const BODY_SIZE: f32 = 12.0;
const HEADING_SIZE: f32 = 14.0;
const SOURCE_SIZE: f32 = 10.0;

const TITLE_Y: f32 = 20.0;
const TOPIC_Y: f32 = 30.0;
const DATE_Y: f32 = 40.0;
const BODY_START_Y: f32 = 60.0;
const SOURCES_START_Y: f32 = 30.0;

const BODY_LINE_ADVANCE: f32 = 7.0;
const PARAGRAPH_GAP: f32 = 5.0;
const SOURCE_LINE_ADVANCE: f32 = 5.0;
const SOURCE_GAP: f32 = 5.0;

const POINTS_PER_MM: f32 = 72.0 / 25.4;
const FONT_RESOURCE: &str = "F1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub x_mm: f32,
    /// Baseline, measured from the top edge.
    pub y_mm: f32,
    pub size: f32,
    pub align: Align,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<PlacedText>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfLayout {
    pub pages: Vec<Page>,
    /// Index of the page the source list starts on.
    pub sources_page: usize,
}

impl PdfLayout {
    fn new() -> Self {
        Self {
            pages: vec![Page::default()],
            sources_page: 0,
        }
    }

    fn add_page(&mut self) {
        self.pages.push(Page::default());
    }

    fn place(&mut self, text: &str, size: f32, y_mm: f32, align: Align) {
        let x_mm = match align {
            Align::Left => MARGIN_MM,
            Align::Center => PAGE_WIDTH_MM / 2.0,
        };
        if let Some(page) = self.pages.last_mut() {
            page.items.push(PlacedText {
                x_mm,
                y_mm,
                size,
                align,
                text: text.to_string(),
            });
        }
    }

    /// Places pre-wrapped lines from `y`, breaking to a new page whenever a
    /// line would fall past the bottom margin. Returns the cursor below the
    /// last line.
    fn place_lines(&mut self, lines: &[String], size: f32, mut y: f32, advance: f32) -> f32 {
        for line in lines {
            if y > LAST_LINE_MM {
                self.add_page();
                y = MARGIN_MM;
            }
            if !line.is_empty() {
                self.place(line, size, y, Align::Left);
            }
            y += advance;
        }
        y
    }

    /// Every word placed on the pages, in reading order.
    #[cfg(test)]
    pub fn words(&self) -> Vec<String> {
        self.pages
            .iter()
            .flat_map(|p| p.items.iter())
            .flat_map(|item| item.text.split_whitespace())
            .map(str::to_string)
            .collect()
    }
}

pub fn layout(doc: &ReportDocument) -> PdfLayout {
    let mut out = PdfLayout::new();

    out.place(&doc.title, TITLE_SIZE, TITLE_Y, Align::Center);
    out.place(&doc.topic_line, TOPIC_SIZE, TOPIC_Y, Align::Center);
    out.place(&doc.date_line, DATE_SIZE, DATE_Y, Align::Center);

    let mut y = BODY_START_Y;
    for paragraph in &doc.paragraphs {
        if y > BOTTOM_THRESHOLD_MM {
            out.add_page();
            y = MARGIN_MM;
        }
        let lines = wrap(paragraph, BODY_SIZE, CONTENT_WIDTH_MM);
        y = out.place_lines(&lines, BODY_SIZE, y, BODY_LINE_ADVANCE) + PARAGRAPH_GAP;
    }

    // Sources always start on a fresh page.
    out.add_page();
    out.sources_page = out.pages.len() - 1;
    out.place(SOURCES_HEADING, HEADING_SIZE, MARGIN_MM, Align::Left);

    let mut y = SOURCES_START_Y;
    for source in &doc.source_lines {
        if y > BOTTOM_THRESHOLD_MM {
            out.add_page();
            y = MARGIN_MM;
        }
        let lines = wrap(source, SOURCE_SIZE, CONTENT_WIDTH_MM);
        y = out.place_lines(&lines, SOURCE_SIZE, y, SOURCE_LINE_ADVANCE) + SOURCE_GAP;
    }

    out
}

pub struct PdfRenderer;

impl Renderer for PdfRenderer {
    fn render(&self, doc: &ReportDocument) -> Result<Vec<u8>, ExportError> {
        let layout = layout(doc);
        let replaced: usize = layout
            .pages
            .iter()
            .flat_map(|p| p.items.iter())
            .map(|item| unencodable_chars(&item.text))
            .sum();
        if replaced > 0 {
            tracing::warn!(export.replaced_chars = replaced, "pdf font cannot show some characters");
        }
        encode(&layout, &doc.title)
    }
}

fn encode(layout: &PdfLayout, title: &str) -> Result<Vec<u8>, ExportError> {
    let mut pdf = Document::with_version("1.5");
    let pages_id = pdf.new_object_id();

    let font_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = pdf.add_object(dictionary! {
        "Font" => dictionary! {
            FONT_RESOURCE => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for page in &layout.pages {
        let content = page_content(page);
        let encoded = content
            .encode()
            .map_err(|e| ExportError::render("pdf", e))?;
        let content_id = pdf.add_object(Stream::new(dictionary! {}, encoded));
        let page_id: ObjectId = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).map_err(|e| ExportError::render("pdf", e))?;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            (PAGE_WIDTH_MM * POINTS_PER_MM).into(),
            (PAGE_HEIGHT_MM * POINTS_PER_MM).into(),
        ],
    };
    pdf.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = pdf.add_object(dictionary! {
        "Title" => Object::string_literal(to_win_ansi(title)),
        "Producer" => Object::string_literal("research-report-service"),
    });
    pdf.trailer.set("Root", catalog_id);
    pdf.trailer.set("Info", info_id);
    pdf.compress();

    let mut buf = Vec::new();
    pdf.save_to(&mut buf)
        .map_err(|e| ExportError::render("pdf", e))?;
    Ok(buf)
}

fn page_content(page: &Page) -> Content {
    let mut operations = Vec::with_capacity(page.items.len() * 5);

    for item in &page.items {
        let x_mm = match item.align {
            Align::Left => item.x_mm,
            Align::Center => item.x_mm - text_width_mm(&item.text, item.size) / 2.0,
        };
        let x = x_mm * POINTS_PER_MM;
        let y = (PAGE_HEIGHT_MM - item.y_mm) * POINTS_PER_MM;

        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![FONT_RESOURCE.into(), item.size.into()],
        ));
        operations.push(Operation::new("Td", vec![x.into(), y.into()]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(to_win_ansi(&item.text))],
        ));
        operations.push(Operation::new("ET", vec![]));
    }

    Content { operations }
}

/// Maps text onto the WinAnsi code page used by the standard Helvetica font.
/// Characters it cannot represent become `?`.
fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(c: char) -> u8 {
    match c {
        '\u{20AC}' => 0x80,
        '\u{2026}' => 0x85,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\t' => b' ',
        c => u8::try_from(u32::from(c))
            .ok()
            .filter(|b| *b >= 0x20 && !(0x7f..0xa0).contains(b))
            .unwrap_or(b'?'),
    }
}

/// Number of characters the PDF font cannot show; each renders as `?`.
fn unencodable_chars(text: &str) -> usize {
    text.chars()
        .filter(|c| *c != '?' && win_ansi_byte(*c) == b'?')
        .count()
}
