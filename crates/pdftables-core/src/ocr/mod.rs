//! OCR escalation for image-only documents.
//!
//! The engine itself is behind [`OcrService`]; this module only turns its
//! positioned tokens into grids and decides whether a document is scanned.

pub mod tesseract;

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

pub use tesseract::TesseractOcr;

use crate::backend::{BBox, BackendError, PdfBackend, TextToken};
use crate::config::OcrSettings;
use crate::grid::TableGrid;
use crate::layout::group_rows;
use crate::{ExtractionMethod, PrivilegeTier};

/// Warning attached when a free-tier caller submits a scanned document.
pub const OCR_UPGRADE_NOTE: &str = "This appears to be a scanned PDF. OCR processing is available for paid users to extract tables from scanned documents.";

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR is not available for the free tier")]
    TierNotAllowed,
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Grids recovered by an OCR pass.
#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub grids: Vec<TableGrid>,
    /// Pages the engine actually processed.
    pub page_count: usize,
}

/// A word recognized by an OCR engine. `confidence` is on the engine's
/// 0-100 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub confidence: f64,
    pub bbox: BBox,
    pub page: usize,
}

pub trait OcrService: Send + Sync {
    /// Whether the document looks image-only.
    fn is_scanned(&self, path: &Path) -> Result<bool, OcrError>;

    /// Recognize the document and rebuild its tables.
    ///
    /// Returns [`OcrError::TierNotAllowed`] unless `tier` allows OCR.
    fn extract_tables(&self, path: &Path, tier: PrivilegeTier) -> Result<OcrOutput, OcrError>;
}

/// Build one grid per page from OCR tokens.
///
/// Low-confidence and blank tokens are dropped, the rest are grouped into
/// rows by vertical position and each row's tokens become its cells. Pages
/// with fewer than two rows produce nothing.
pub fn tokens_to_grids(tokens: &[OcrToken], settings: &OcrSettings) -> Vec<TableGrid> {
    let mut pages: BTreeMap<usize, Vec<TextToken>> = BTreeMap::new();
    for token in tokens {
        if token.confidence <= settings.min_token_confidence || token.text.trim().is_empty() {
            continue;
        }
        pages
            .entry(token.page)
            .or_default()
            .push(TextToken::new(token.text.trim(), token.bbox, token.page));
    }

    pages
        .into_iter()
        .filter_map(|(page, words)| {
            let rows: Vec<Vec<String>> = group_rows(&words, settings.row_tolerance)
                .into_iter()
                .map(|row| row.into_iter().map(|w| w.text.clone()).collect())
                .collect();
            (rows.len() >= 2).then(|| TableGrid::new(rows, ExtractionMethod::Ocr, Some(page)))
        })
        .collect()
}

/// Sample the first pages' text and call the document scanned when the
/// average trimmed text length is under the threshold. Backend failures
/// count as scanned.
pub fn detect_scanned(backend: &dyn PdfBackend, path: &Path, settings: &OcrSettings) -> bool {
    let pages = match backend.page_count(path) {
        Ok(n) => n.min(settings.scan_sample_pages.max(1)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "scan check failed, assuming scanned");
            return true;
        }
    };
    if pages == 0 {
        return true;
    }

    let mut total = 0usize;
    for page in 1..=pages {
        match backend.page_text(path, page) {
            Ok(text) => total += text.trim().chars().count(),
            Err(e) => {
                tracing::warn!(path = %path.display(), page, error = %e, "scan check failed, assuming scanned");
                return true;
            }
        }
    }
    total / pages < settings.scanned_text_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn token(text: &str, confidence: f64, x: f32, y: f32, page: usize) -> OcrToken {
        OcrToken {
            text: text.to_string(),
            confidence,
            bbox: BBox::new(x, y, x + 40.0, y + 20.0),
            page,
        }
    }

    #[test]
    fn groups_tokens_into_rows() {
        let tokens = vec![
            token("Qty", 90.0, 200.0, 102.0, 1),
            token("Item", 95.0, 20.0, 100.0, 1),
            token("Apple", 88.0, 20.0, 140.0, 1),
            token("3", 91.0, 200.0, 145.0, 1),
        ];
        let grids = tokens_to_grids(&tokens, &OcrSettings::default());
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].rows()[0], vec!["Item", "Qty"]);
        assert_eq!(grids[0].rows()[1], vec!["Apple", "3"]);
        assert_eq!(grids[0].method(), ExtractionMethod::Ocr);
    }

    #[test]
    fn drops_low_confidence_and_blank_tokens() {
        let tokens = vec![
            token("Item", 95.0, 20.0, 100.0, 1),
            token("noise", 30.0, 200.0, 100.0, 1),
            token("  ", 99.0, 300.0, 100.0, 1),
            token("Apple", 88.0, 20.0, 140.0, 1),
        ];
        let grids = tokens_to_grids(&tokens, &OcrSettings::default());
        assert_eq!(grids[0].column_count(), 1);
    }

    #[test]
    fn single_row_pages_produce_nothing() {
        let tokens = vec![
            token("a", 95.0, 20.0, 100.0, 1),
            token("b", 95.0, 20.0, 100.0, 2),
            token("c", 95.0, 20.0, 140.0, 2),
        ];
        let grids = tokens_to_grids(&tokens, &OcrSettings::default());
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].page(), Some(2));
    }

    #[test]
    fn pads_short_rows() {
        let tokens = vec![
            token("a", 95.0, 20.0, 100.0, 1),
            token("b", 95.0, 100.0, 100.0, 1),
            token("c", 95.0, 20.0, 140.0, 1),
        ];
        let grids = tokens_to_grids(&tokens, &OcrSettings::default());
        assert_eq!(grids[0].rows()[1], vec!["c", ""]);
    }

    #[test]
    fn text_poor_documents_are_scanned() {
        let settings = OcrSettings::default();
        let scanned = MockBackend::new().with_page("", Vec::new()).with_page(" p2 ", Vec::new());
        assert!(detect_scanned(&scanned, Path::new("a.pdf"), &settings));

        let text = "x".repeat(200);
        let digital = MockBackend::new()
            .with_page(&text, Vec::new())
            .with_page(&text, Vec::new());
        assert!(!detect_scanned(&digital, Path::new("a.pdf"), &settings));
    }

    #[test]
    fn backend_failure_counts_as_scanned() {
        let broken = MockBackend::new().failing_open();
        assert!(detect_scanned(&broken, Path::new("a.pdf"), &OcrSettings::default()));
    }
}
