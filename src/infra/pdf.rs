//! PDF output via `lopdf`.
//!
//! Layout is a single top-to-bottom flow per page tree: text blocks are word
//! wrapped against an average glyph width, spacers move the cursor, and the
//! flow spills onto a fresh physical page whenever it runs past the bottom
//! margin or hits an explicit break.
//!
//! Layout and assembly are CPU bound and run on the blocking pool. A document
//! may spill onto at most [`MAX_PAGES`] physical pages.

use std::path::Path;

use async_trait::async_trait;
use lopdf::{
    Dictionary, Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};
use tracing::debug;

use crate::{
    application::render::{RenderError, Renderer},
    domain::tree::{Block, DocumentMetadata, DocumentTree, PageTree, Rgb, TextStyle},
};

const PDF_VERSION: &str = "1.7";
const PRODUCER: &str = "pdf-renderer";
const REGULAR_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";
const REGULAR_GLYPH_WIDTH: f32 = 0.5;
const BOLD_GLYPH_WIDTH: f32 = 0.55;
/// Ascent of the standard Helvetica faces, as a fraction of the font size.
const ASCENT: f32 = 0.8;
/// Upper bound on physical pages per document. A body at the ingest limit
/// set in ordinary text stays well below it.
pub const MAX_PAGES: usize = 10_000;

/// Renders document trees with the standard Helvetica faces.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfRenderer;

#[async_trait]
impl Renderer for PdfRenderer {
    async fn render(&self, tree: &DocumentTree, output: &Path) -> Result<(), RenderError> {
        if tree.pages.is_empty() {
            return Err(RenderError::EmptyDocument);
        }

        let tree = tree.clone();
        let (page_count, bytes) = tokio::task::spawn_blocking(move || {
            let pages = layout(&tree.pages, MAX_PAGES)?;
            let bytes = assemble(&tree.metadata, &pages)?;
            Ok::<_, RenderError>((pages.len(), bytes))
        })
        .await
        .map_err(engine_error)??;
        debug!(
            pages = page_count,
            bytes = bytes.len(),
            path = %output.display(),
            "writing rendered document"
        );

        tokio::fs::write(output, bytes)
            .await
            .map_err(|err| RenderError::io(output, err))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PlacedLine {
    x: f32,
    baseline: f32,
    font_size: f32,
    bold: bool,
    color: Rgb,
    text: String,
}

#[derive(Debug, Clone, PartialEq)]
struct LaidOutPage {
    width: f32,
    height: f32,
    lines: Vec<PlacedLine>,
}

struct Flow<'a> {
    page: &'a PageTree,
    /// Pages this flow may still emit.
    budget: usize,
    overflowed: bool,
    finished: Vec<LaidOutPage>,
    current: Vec<PlacedLine>,
    /// Distance from the bottom edge to the top of the next line.
    cursor: f32,
}

impl<'a> Flow<'a> {
    fn new(page: &'a PageTree, budget: usize) -> Self {
        Self {
            page,
            budget,
            overflowed: false,
            finished: Vec::new(),
            current: Vec::new(),
            cursor: page.height - page.margin,
        }
    }

    fn bottom(&self) -> f32 {
        self.page.margin
    }

    fn content_width(&self) -> f32 {
        (self.page.width - 2.0 * self.page.margin).max(0.0)
    }

    fn page_is_blank(&self) -> bool {
        self.current.is_empty()
    }

    fn close_page(&mut self) {
        self.finished.push(LaidOutPage {
            width: self.page.width,
            height: self.page.height,
            lines: std::mem::take(&mut self.current),
        });
    }

    fn break_page(&mut self) {
        if self.overflowed {
            return;
        }
        self.close_page();
        self.cursor = self.page.height - self.page.margin;
        if self.finished.len() >= self.budget {
            self.overflowed = true;
        }
    }

    fn advance(&mut self, amount: f32) {
        self.cursor -= amount;
        if self.cursor < self.bottom() && !self.page_is_blank() {
            self.break_page();
        }
    }

    fn text(&mut self, text: &str, style: &TextStyle) {
        self.advance(style.margin_top);

        let leading = style.leading();
        let available = (self.content_width() - style.indent).max(style.font_size);
        // At least enough lines to fill every page left in the budget and overflow it.
        let per_page =
            ((self.page.height - 2.0 * self.page.margin) / leading).floor().max(1.0) as usize;
        let max_lines = self
            .budget
            .saturating_sub(self.finished.len())
            .saturating_mul(per_page.saturating_add(1))
            .saturating_add(1);
        for line in wrap(text, style, available, max_lines) {
            if self.cursor - leading < self.bottom() && !self.page_is_blank() {
                self.break_page();
            }
            if self.overflowed {
                return;
            }
            self.current.push(PlacedLine {
                x: self.page.margin + style.indent,
                baseline: self.cursor - style.font_size * ASCENT,
                font_size: style.font_size,
                bold: style.bold,
                color: style.color,
                text: line,
            });
            self.cursor -= leading;
        }

        self.advance(style.margin_bottom);
    }

    /// Close the last page. `None` when the flow ran past its budget.
    fn finish(mut self) -> Option<Vec<LaidOutPage>> {
        if self.overflowed {
            return None;
        }
        self.close_page();
        Some(self.finished)
    }
}

/// Lay out every page tree, failing once more than `max_pages` physical
/// pages would be produced.
fn layout(trees: &[PageTree], max_pages: usize) -> Result<Vec<LaidOutPage>, RenderError> {
    let mut pages = Vec::new();
    for tree in trees {
        let budget = max_pages.saturating_sub(pages.len());
        let laid_out =
            layout_page(tree, budget).ok_or(RenderError::TooManyPages { limit: max_pages })?;
        pages.extend(laid_out);
    }
    Ok(pages)
}

fn layout_page(page: &PageTree, budget: usize) -> Option<Vec<LaidOutPage>> {
    if budget == 0 {
        return None;
    }
    let mut flow = Flow::new(page, budget);
    for block in &page.blocks {
        match block {
            Block::Text { text, style } => flow.text(text, style),
            Block::Spacer { height } => flow.advance(*height),
            Block::PageBreak => flow.break_page(),
        }
        if flow.overflowed {
            return None;
        }
    }
    flow.finish()
}

fn glyph_width(style: &TextStyle) -> f32 {
    let factor = if style.bold {
        BOLD_GLYPH_WIDTH
    } else {
        REGULAR_GLYPH_WIDTH
    };
    style.font_size * factor
}

/// Greedy word wrap. Words wider than the line are split across lines.
/// Stops after `max_lines` lines.
fn wrap(text: &str, style: &TextStyle, width: f32, max_lines: usize) -> Vec<String> {
    let per_line = ((width / glyph_width(style)).floor() as usize).max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_len = 0usize;

        for word in paragraph.split_whitespace() {
            if lines.len() >= max_lines {
                lines.truncate(max_lines);
                return lines;
            }
            let word: Vec<char> = word.chars().collect();
            let mut chars = word.as_slice();
            if chars.len() > per_line && line_len > 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            while chars.len() > per_line && lines.len() < max_lines {
                let (head, rest) = chars.split_at(per_line);
                lines.push(head.iter().collect());
                chars = rest;
            }

            let needed = if line_len == 0 {
                chars.len()
            } else {
                line_len + 1 + chars.len()
            };
            if needed > per_line && line_len > 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(chars.iter());
            line_len += chars.len();
        }

        lines.push(line);
        if lines.len() >= max_lines {
            break;
        }
    }

    lines.truncate(max_lines);
    lines
}

/// WinAnsi bytes for `text`; anything outside Latin-1 becomes `?`.
fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| u8::try_from(u32::from(ch)).unwrap_or(b'?'))
        .collect()
}

fn engine_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Engine(err.to_string())
}

fn assemble(metadata: &DocumentMetadata, pages: &[LaidOutPage]) -> Result<Vec<u8>, RenderError> {
    let mut document = Document::with_version(PDF_VERSION);
    let pages_id = document.new_object_id();

    let regular_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR_FONT => regular_id,
            BOLD_FONT => bold_id,
        },
    });

    let mut kids: Vec<ObjectId> = Vec::with_capacity(pages.len());
    for page in pages {
        let content = page_content(page);
        let encoded = content.encode().map_err(engine_error)?;
        let content_id = document.add_object(Stream::new(Dictionary::new(), encoded));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id);
    }

    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.iter().copied().map(Object::from).collect::<Vec<_>>(),
            "Count" => kids.len() as i64,
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut info = dictionary! {
        "Producer" => Object::string_literal(PRODUCER),
    };
    let fields = [
        ("Title", &metadata.title),
        ("Author", &metadata.author),
        ("Subject", &metadata.subject),
        ("Keywords", &metadata.keywords),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            info.set(key, Object::string_literal(encode_latin1(value)));
        }
    }
    let info_id = document.add_object(info);
    document.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).map_err(engine_error)?;
    Ok(bytes)
}

fn page_content(page: &LaidOutPage) -> Content {
    let mut operations = Vec::with_capacity(page.lines.len() * 5);
    for line in &page.lines {
        if line.text.is_empty() {
            continue;
        }
        let font = if line.bold { BOLD_FONT } else { REGULAR_FONT };
        let (r, g, b) = line.color.as_unit();
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec![font.into(), line.font_size.into()]));
        operations.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
        operations.push(Operation::new("Td", vec![line.x.into(), line.baseline.into()]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_latin1(&line.text))],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn text(value: &str) -> Block {
        Block::Text {
            text: value.to_string(),
            style: TextStyle::default(),
        }
    }

    fn lay_out(page: &PageTree) -> Vec<LaidOutPage> {
        layout_page(page, MAX_PAGES).expect("within page budget")
    }

    fn page(height: f32, blocks: Vec<Block>) -> PageTree {
        PageTree {
            width: 200.0,
            height,
            margin: 10.0,
            blocks,
        }
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let style = TextStyle::default();
        // 6pt average glyph width, 60pt line: ten glyphs per line.
        let lines = wrap("alpha beta gamma delta", &style, 60.0, usize::MAX);
        assert_eq!(lines, vec!["alpha beta", "gamma", "delta"]);
    }

    #[test]
    fn splits_words_longer_than_a_line() {
        let style = TextStyle::default();
        let lines = wrap("abcdefghijklmnop", &style, 36.0, usize::MAX);
        assert_eq!(lines, vec!["abcdef", "ghijkl", "mnop"]);
    }

    #[test]
    fn keeps_explicit_newlines() {
        let style = TextStyle::default();
        assert_eq!(wrap("one\ntwo", &style, 500.0, usize::MAX), vec!["one", "two"]);
    }

    #[test]
    fn wrapping_stops_at_the_line_cap() {
        let style = TextStyle::default();
        assert_eq!(wrap("a b c d e", &style, 6.0, 3), vec!["a", "b", "c"]);
        let long_word = "x".repeat(1_000);
        assert_eq!(wrap(&long_word, &style, 6.0, 2).len(), 2);
    }

    #[test]
    fn replaces_characters_outside_latin1() {
        assert_eq!(encode_latin1("café €5"), b"caf\xe9 ?5".to_vec());
    }

    #[test]
    fn overflowing_flow_spills_onto_new_pages() {
        let blocks = (0..20).map(|i| text(&format!("line {i}"))).collect();
        let pages = lay_out(&page(100.0, blocks));

        // 80pt of usable height at 14.4pt leading fits five lines per page.
        assert_eq!(pages.len(), 4);
        assert!(pages.iter().all(|p| p.lines.len() == 5));
        assert!(
            pages
                .iter()
                .flat_map(|p| &p.lines)
                .all(|line| line.baseline >= 10.0)
        );
    }

    #[test]
    fn explicit_breaks_start_a_new_page() {
        let pages = lay_out(&page(400.0, vec![text("a"), Block::PageBreak, text("b")]));
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].lines[0].text, "a");
        assert_eq!(pages[1].lines[0].text, "b");
    }

    #[test]
    fn empty_page_tree_still_produces_a_page() {
        let pages = lay_out(&page(400.0, Vec::new()));
        assert_eq!(pages.len(), 1);
        assert!(pages[0].lines.is_empty());
    }

    #[test]
    fn indent_and_spacers_shift_lines() {
        let indented = Block::Text {
            text: "x".to_string(),
            style: TextStyle {
                indent: 15.0,
                ..TextStyle::default()
            },
        };
        let pages = lay_out(&page(400.0, vec![Block::Spacer { height: 20.0 }, indented]));
        let line = &pages[0].lines[0];
        assert_eq!(line.x, 25.0);
        assert_eq!(line.baseline, 400.0 - 10.0 - 20.0 - 12.0 * ASCENT);
    }

    #[test]
    fn layout_fails_once_the_page_budget_is_spent() {
        let blocks: Vec<Block> = (0..20).map(|i| text(&format!("line {i}"))).collect();
        let tree = page(100.0, blocks);

        assert_eq!(layout(std::slice::from_ref(&tree), 4).expect("fits").len(), 4);
        let err = layout(&[tree.clone(), tree], 6).expect_err("over budget");
        assert!(matches!(err, RenderError::TooManyPages { limit: 6 }));
    }

    #[tokio::test]
    async fn oversized_fonts_cannot_multiply_pages_without_bound() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = temp.path().join("out.pdf");
        let tree = DocumentTree {
            metadata: DocumentMetadata::default(),
            pages: vec![PageTree {
                width: 595.0,
                height: 842.0,
                margin: 36.0,
                blocks: vec![Block::Text {
                    text: "a ".repeat(MAX_PAGES * 2),
                    style: TextStyle {
                        font_size: 2000.0,
                        ..TextStyle::default()
                    },
                }],
            }],
        };

        let err = PdfRenderer.render(&tree, &output).await.expect_err("too many pages");
        assert!(matches!(err, RenderError::TooManyPages { limit: MAX_PAGES }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn large_renders_leave_the_runtime_responsive() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = temp.path().join("out.pdf");
        let tree = DocumentTree {
            metadata: DocumentMetadata::default(),
            pages: vec![PageTree {
                width: 595.0,
                height: 842.0,
                margin: 36.0,
                blocks: vec![text(&"lorem ipsum dolor sit amet ".repeat(100_000))],
            }],
        };

        // The test runtime is single threaded, so the timer only fires on time
        // if rendering yields to it.
        let started = Instant::now();
        let render = PdfRenderer.render(&tree, &output);
        tokio::pin!(render);
        tokio::select! {
            biased;
            result = &mut render => result.expect("render"),
            () = tokio::time::sleep(Duration::from_millis(10)) => {
                let waited = started.elapsed();
                assert!(waited < Duration::from_millis(150), "timer starved for {waited:?}");
                render.await.expect("render");
            }
        }
        assert!(output.exists());
    }

    #[tokio::test]
    async fn writes_a_pdf_to_the_output_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = temp.path().join("out.pdf");
        let tree = DocumentTree {
            metadata: DocumentMetadata {
                title: Some("Report".to_string()),
                ..DocumentMetadata::default()
            },
            pages: vec![page(400.0, vec![text("Hello world")])],
        };

        PdfRenderer.render(&tree, &output).await.expect("render");

        let bytes = tokio::fs::read(&output).await.expect("read output");
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(bytes.windows(11).any(|w| w == b"Hello world"));
        assert!(bytes.windows(6).any(|w| w == b"Report"));
    }

    #[tokio::test]
    async fn refuses_documents_without_pages() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = temp.path().join("out.pdf");
        let tree = DocumentTree {
            metadata: DocumentMetadata::default(),
            pages: Vec::new(),
        };

        let err = PdfRenderer.render(&tree, &output).await.expect_err("empty");
        assert!(matches!(err, RenderError::EmptyDocument));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn unwritable_output_is_an_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = temp.path().join("missing").join("out.pdf");
        let tree = DocumentTree {
            metadata: DocumentMetadata::default(),
            pages: vec![page(400.0, Vec::new())],
        };

        let err = PdfRenderer.render(&tree, &output).await.expect_err("io");
        assert!(matches!(err, RenderError::Io { .. }));
    }
}
