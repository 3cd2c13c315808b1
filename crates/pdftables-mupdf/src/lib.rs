use std::path::Path;

use mupdf::{Document, Page, TextPageFlags};

use pdftables_core::{BBox, BackendError, PdfBackend, TextToken};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that the cascade, scorer and CLI plumbing do not
/// transitively depend on it.
///
/// Words are rebuilt from character quads, splitting on whitespace and on
/// horizontal jumps wider than `WORD_GAP_RATIO` times the character height,
/// so columns separated only by positioning still become separate words.
#[derive(Debug, Default)]
pub struct MupdfBackend;

/// Horizontal gap, as a fraction of character height, that splits words.
const WORD_GAP_RATIO: f32 = 0.3;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<Document, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
        Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))
    }

    fn load_page(path: &Path, page: usize) -> Result<Page, BackendError> {
        let document = Self::open(path)?;
        let count = page_count_of(&document)?;
        if page == 0 || page > count {
            return Err(BackendError::PageOutOfRange { page, count });
        }
        document
            .load_page((page - 1) as i32)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))
    }
}

fn page_count_of(document: &Document) -> Result<usize, BackendError> {
    let count = document
        .page_count()
        .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
    Ok(count.max(0) as usize)
}

/// Word under construction.
struct WordBuilder {
    text: String,
    bbox: BBox,
}

impl PdfBackend for MupdfBackend {
    fn page_count(&self, path: &Path) -> Result<usize, BackendError> {
        page_count_of(&Self::open(path)?)
    }

    fn page_text(&self, path: &Path, page: usize) -> Result<String, BackendError> {
        let page = Self::load_page(path, page)?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let mut text = String::new();
        for block in text_page.blocks() {
            for line in block.lines() {
                let line_text: String = line
                    .chars()
                    .map(|c| c.char().unwrap_or('\u{FFFD}'))
                    .collect();
                text.push_str(&line_text);
                text.push('\n');
            }
        }
        Ok(text)
    }

    fn page_words(&self, path: &Path, page: usize) -> Result<Vec<TextToken>, BackendError> {
        let page_no = page;
        let page = Self::load_page(path, page)?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let mut words = Vec::new();
        for block in text_page.blocks() {
            for line in block.lines() {
                let mut current: Option<WordBuilder> = None;
                for ch in line.chars() {
                    let c = ch.char().unwrap_or('\u{FFFD}');
                    let quad = ch.quad();
                    let bbox = BBox::new(
                        quad.ul.x.min(quad.ll.x),
                        quad.ul.y.min(quad.ur.y),
                        quad.ur.x.max(quad.lr.x),
                        quad.ll.y.max(quad.lr.y),
                    );

                    if c.is_whitespace() {
                        flush(&mut current, &mut words, page_no);
                        continue;
                    }
                    let jump = current
                        .as_ref()
                        .is_some_and(|w| bbox.x0 - w.bbox.x1 > WORD_GAP_RATIO * bbox.height());
                    if jump {
                        flush(&mut current, &mut words, page_no);
                    }
                    match current.as_mut() {
                        Some(w) => {
                            w.text.push(c);
                            w.bbox = w.bbox.union(&bbox);
                        }
                        None => {
                            current = Some(WordBuilder {
                                text: c.to_string(),
                                bbox,
                            })
                        }
                    }
                }
                flush(&mut current, &mut words, page_no);
            }
        }
        tracing::trace!(page = page_no, words = words.len(), "extracted page words");
        Ok(words)
    }
}

fn flush(current: &mut Option<WordBuilder>, words: &mut Vec<TextToken>, page: usize) {
    if let Some(w) = current.take() {
        words.push(TextToken::new(w.text, w.bbox, page));
    }
}
