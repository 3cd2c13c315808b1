//! Picks the first strategy to try from a cheap sample of page 1.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backend::PdfBackend;
use crate::config::SelectorSettings;
use crate::ExtractionMethod;

static NUMERIC_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$?[\d,]+\.?\d*").unwrap());

pub struct MethodSelector {
    backend: Arc<dyn PdfBackend>,
    settings: SelectorSettings,
}

impl MethodSelector {
    pub fn new(backend: Arc<dyn PdfBackend>, settings: SelectorSettings) -> Self {
        Self { backend, settings }
    }

    /// Best-effort: any failure to read page 1 yields `Primary`.
    pub fn select(&self, path: &Path) -> ExtractionMethod {
        match self.backend.page_text(path, 1) {
            Ok(text) => {
                let method = select_from_text(&text, &self.settings);
                tracing::debug!(path = %path.display(), method = %method, "selected first strategy");
                method
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "method selection failed, using primary");
                ExtractionMethod::Primary
            }
        }
    }
}

/// Classify a page sample: many tabs or pipes suggest a bordered table,
/// many numeric tokens a dense numeric one.
pub fn select_from_text(text: &str, settings: &SelectorSettings) -> ExtractionMethod {
    let separators = text.chars().filter(|c| matches!(c, '\t' | '|')).count();
    if separators > settings.separator_threshold {
        return ExtractionMethod::Secondary;
    }
    if NUMERIC_TOKEN_RE.find_iter(text).count() > settings.numeric_threshold {
        return ExtractionMethod::Tertiary;
    }
    ExtractionMethod::Primary
}
