use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract page content: {0}")]
    ExtractionError(String),
    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Axis-aligned box in page space, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// A positioned word on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub bbox: BBox,
    /// 1-based page number.
    pub page: usize,
}

impl TextToken {
    pub fn new(text: impl Into<String>, bbox: BBox, page: usize) -> Self {
        Self {
            text: text.into(),
            bbox,
            page,
        }
    }
}

/// Trait for PDF content backends.
///
/// Implementors provide the low-level page access; table detection,
/// scoring and the fallback cascade live in this crate. Pages are 1-based.
pub trait PdfBackend: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, path: &Path) -> Result<usize, BackendError>;

    /// Plain text of a single page, lines separated by `\n`.
    fn page_text(&self, path: &Path, page: usize) -> Result<String, BackendError>;

    /// Positioned words of a single page, in reading order.
    fn page_words(&self, path: &Path, page: usize) -> Result<Vec<TextToken>, BackendError>;
}
