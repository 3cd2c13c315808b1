use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod cell;
pub mod config;
pub mod config_file;
pub mod grid;
pub mod layout;
pub mod mock;
pub mod ocr;
pub mod orchestrator;
pub mod pool;
pub mod scoring;
pub mod selector;
pub mod strategy;

// Re-export for convenience
pub use backend::{BBox, BackendError, PdfBackend, TextToken};
pub use config::{ExtractionConfig, OcrSettings, PoolSettings, SelectorSettings};
pub use grid::{TableGrid, TableSummary};
pub use ocr::{OCR_UPGRADE_NOTE, OcrError, OcrOutput, OcrService};
pub use orchestrator::TableExtractor;
pub use scoring::{ScoringWeights, score_grid};
pub use selector::MethodSelector;
pub use strategy::{ExtractionStrategy, StrategyError, StrategySet};

/// The fixed vocabulary of extraction techniques.
///
/// `Primary`, `Secondary` and `Tertiary` form the standard ordering;
/// `Enhanced` and `TextHeuristic` are fallbacks; `Ocr` is the privileged
/// escalation path for scanned documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// General-purpose word-position detection.
    Primary,
    /// Strict column-anchored detection for bordered tables.
    Secondary,
    /// Loose gap-based detection for dense numeric tables.
    Tertiary,
    /// Primary detection retried under several relaxed settings.
    Enhanced,
    /// Delimiter guessing over raw page text.
    TextHeuristic,
    Ocr,
}

impl ExtractionMethod {
    pub const STANDARD: [ExtractionMethod; 3] = [
        ExtractionMethod::Primary,
        ExtractionMethod::Secondary,
        ExtractionMethod::Tertiary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Primary => "primary",
            ExtractionMethod::Secondary => "secondary",
            ExtractionMethod::Tertiary => "tertiary",
            ExtractionMethod::Enhanced => "enhanced",
            ExtractionMethod::TextHeuristic => "text_heuristic",
            ExtractionMethod::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "primary" => Ok(ExtractionMethod::Primary),
            "secondary" => Ok(ExtractionMethod::Secondary),
            "tertiary" => Ok(ExtractionMethod::Tertiary),
            "enhanced" => Ok(ExtractionMethod::Enhanced),
            "text_heuristic" | "text" => Ok(ExtractionMethod::TextHeuristic),
            "ocr" => Ok(ExtractionMethod::Ocr),
            other => Err(format!("unknown extraction method: {other}")),
        }
    }
}

/// Caller classification gating the OCR escalation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeTier {
    #[default]
    Free,
    Paid,
}

impl PrivilegeTier {
    pub fn allows_ocr(&self) -> bool {
        matches!(self, PrivilegeTier::Paid)
    }
}

impl FromStr for PrivilegeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PrivilegeTier::Free),
            "paid" | "pro" | "premium" | "enterprise" => Ok(PrivilegeTier::Paid),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

impl fmt::Display for PrivilegeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivilegeTier::Free => f.write_str("free"),
            PrivilegeTier::Paid => f.write_str("paid"),
        }
    }
}

/// How an extraction request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A strategy cleared its acceptance bar.
    Success,
    /// Nothing cleared a bar; the best under-bar attempt is returned.
    LowConfidence,
    Empty,
    /// The time budget ran out between attempts.
    TimedOut,
    Cancelled,
}

/// Diagnostic record of one strategy invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub method: ExtractionMethod,
    pub tables: usize,
    pub mean_confidence: f64,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Final answer for one extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultAggregate {
    pub tables: Vec<TableGrid>,
    /// Parallel to `tables`.
    pub confidence_scores: Vec<f64>,
    pub method: Option<ExtractionMethod>,
    pub outcome: Outcome,
    pub processing_time: Duration,
    pub warnings: Vec<String>,
    pub attempts: Vec<AttemptSummary>,
}

impl ResultAggregate {
    pub fn empty() -> Self {
        Self {
            tables: Vec::new(),
            confidence_scores: Vec::new(),
            method: None,
            outcome: Outcome::Empty,
            processing_time: Duration::ZERO,
            warnings: Vec::new(),
            attempts: Vec::new(),
        }
    }

    pub fn total_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn processing_secs(&self) -> f64 {
        self.processing_time.as_secs_f64()
    }

    pub fn mean_confidence(&self) -> f64 {
        scoring::mean(&self.confidence_scores)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("extraction exceeded hard timeout of {0:?}")]
    HardTimeout(Duration),
    #[error("extraction worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Extract tables from `path` with the given extractor.
///
/// Equivalent to [`TableExtractor::extract`] without a cancellation token.
pub fn extract_tables(
    extractor: &TableExtractor,
    path: &Path,
    tier: PrivilegeTier,
) -> Result<ResultAggregate, ExtractError> {
    extractor.extract(path, tier, None)
}
