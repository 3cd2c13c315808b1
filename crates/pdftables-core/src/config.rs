use std::time::Duration;

use crate::ExtractionMethod;
use crate::config_file::ConfigFile;
use crate::scoring::ScoringWeights;

/// Thresholds for the page-1 sample that picks the first strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorSettings {
    /// Tab and pipe characters above which the page counts as bordered.
    pub separator_threshold: usize,
    /// Numeric tokens above which the page counts as dense numeric.
    pub numeric_threshold: usize,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            separator_threshold: 20,
            numeric_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrSettings {
    pub dpi: u32,
    pub max_pages: usize,
    /// Tokens at or below this engine confidence (0-100) are dropped.
    pub min_token_confidence: f64,
    /// Max vertical distance, in pixels, between tokens on one row.
    pub row_tolerance: f32,
    pub scan_sample_pages: usize,
    /// Average characters per sampled page below which a document is scanned.
    pub scanned_text_threshold: usize,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_pages: 10,
            min_token_confidence: 30.0,
            row_tolerance: 10.0,
            scan_sample_pages: 3,
            scanned_text_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub num_workers: usize,
    /// External kill applied to each job, independent of the cascade budget.
    pub hard_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            num_workers: 2,
            hard_timeout: Duration::from_secs(60),
        }
    }
}

/// Everything the orchestrator needs to run a cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Mean confidence an ordered strategy must reach to win.
    pub confidence_threshold: f64,
    /// Soft budget checked between attempts.
    pub time_budget: Duration,
    pub enhanced_min_confidence: f64,
    pub text_heuristic_min_confidence: f64,
    pub text_heuristic_penalty: f64,
    /// Fixed confidence assigned to every OCR grid.
    pub ocr_confidence: f64,
    pub min_rows: usize,
    pub default_order: Vec<ExtractionMethod>,
    pub scoring_weights: ScoringWeights,
    pub selector: SelectorSettings,
    pub ocr: OcrSettings,
    pub pool: PoolSettings,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            time_budget: Duration::from_secs(30),
            enhanced_min_confidence: 0.3,
            text_heuristic_min_confidence: 0.2,
            text_heuristic_penalty: 0.7,
            ocr_confidence: 0.7,
            min_rows: 2,
            default_order: ExtractionMethod::STANDARD.to_vec(),
            scoring_weights: ScoringWeights::default(),
            selector: SelectorSettings::default(),
            ocr: OcrSettings::default(),
            pool: PoolSettings::default(),
        }
    }
}

impl ExtractionConfig {
    /// Overlay values present in `file` on top of this config.
    ///
    /// Unknown method names in `default_order` and time budgets that are not
    /// a representable non-negative duration are skipped with a warning.
    pub fn apply_file(mut self, file: &ConfigFile) -> Self {
        if let Some(c) = &file.cascade {
            if let Some(v) = c.confidence_threshold {
                self.confidence_threshold = v.clamp(0.0, 1.0);
            }
            if let Some(v) = c.time_budget_secs {
                match Duration::try_from_secs_f64(v) {
                    Ok(budget) => self.time_budget = budget,
                    Err(e) => tracing::warn!("ignoring time_budget_secs = {}: {}", v, e),
                }
            }
            if let Some(v) = c.enhanced_min_confidence {
                self.enhanced_min_confidence = v;
            }
            if let Some(v) = c.text_heuristic_min_confidence {
                self.text_heuristic_min_confidence = v;
            }
            if let Some(v) = c.text_heuristic_penalty {
                self.text_heuristic_penalty = v;
            }
            if let Some(v) = c.ocr_confidence {
                self.ocr_confidence = v;
            }
            if let Some(v) = c.min_rows {
                self.min_rows = v.max(2);
            }
            if let Some(order) = &c.default_order {
                let parsed: Vec<ExtractionMethod> = order
                    .iter()
                    .filter_map(|name| match name.parse() {
                        Ok(m) => Some(m),
                        Err(e) => {
                            tracing::warn!("ignoring default_order entry: {}", e);
                            None
                        }
                    })
                    .collect();
                if !parsed.is_empty() {
                    self.default_order = parsed;
                }
            }
            if let Some(w) = &c.weights {
                self.scoring_weights = w.clone();
            }
        }
        if let Some(s) = &file.selector {
            if let Some(v) = s.separator_threshold {
                self.selector.separator_threshold = v;
            }
            if let Some(v) = s.numeric_threshold {
                self.selector.numeric_threshold = v;
            }
        }
        if let Some(o) = &file.ocr {
            if let Some(v) = o.dpi {
                self.ocr.dpi = v;
            }
            if let Some(v) = o.max_pages {
                self.ocr.max_pages = v;
            }
            if let Some(v) = o.min_token_confidence {
                self.ocr.min_token_confidence = v;
            }
            if let Some(v) = o.row_tolerance {
                self.ocr.row_tolerance = v;
            }
            if let Some(v) = o.scan_sample_pages {
                self.ocr.scan_sample_pages = v;
            }
            if let Some(v) = o.scanned_text_threshold {
                self.ocr.scanned_text_threshold = v;
            }
        }
        if let Some(p) = &file.pool {
            if let Some(v) = p.num_workers {
                self.pool.num_workers = v.max(1);
            }
            if let Some(v) = p.hard_timeout_secs {
                self.pool.hard_timeout = Duration::from_secs(v);
            }
        }
        self
    }
}
