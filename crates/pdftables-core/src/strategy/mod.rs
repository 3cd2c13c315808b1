//! Extraction strategy trait and implementations.

pub mod geometric;
pub mod ocr;
pub mod text_heuristic;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

pub use geometric::{EnhancedStrategy, PrimaryStrategy, SecondaryStrategy, TertiaryStrategy};
pub use ocr::OcrStrategy;
pub use text_heuristic::TextHeuristicStrategy;

use crate::backend::{BackendError, PdfBackend};
use crate::config::ExtractionConfig;
use crate::grid::TableGrid;
use crate::ocr::OcrError;
use crate::scoring;
use crate::{AttemptSummary, ExtractionMethod};

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error("{0}")]
    Failed(String),
}

/// One interchangeable table-extraction technique.
pub trait ExtractionStrategy: Send + Sync {
    /// The method tag recorded on every grid this strategy produces.
    fn method(&self) -> ExtractionMethod;

    /// Extract candidate tables from the document at `path`.
    ///
    /// Per-page failures are skipped; failing to open the document is an error.
    fn run(&self, path: &Path) -> Result<Vec<TableGrid>, StrategyError>;
}

/// Registry of strategies keyed by method.
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: BTreeMap<ExtractionMethod, Arc<dyn ExtractionStrategy>>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five document strategies built on `backend`.
    pub fn standard(backend: Arc<dyn PdfBackend>, config: &ExtractionConfig) -> Self {
        let min_rows = config.min_rows;
        Self::new()
            .with(PrimaryStrategy::new(backend.clone(), min_rows))
            .with(SecondaryStrategy::new(backend.clone(), min_rows))
            .with(TertiaryStrategy::new(backend.clone(), min_rows))
            .with(EnhancedStrategy::new(
                backend.clone(),
                min_rows,
                config.scoring_weights.clone(),
                config.enhanced_min_confidence,
            ))
            .with(TextHeuristicStrategy::new(backend, min_rows))
    }

    /// Register `strategy`, replacing any previous one with the same method.
    pub fn with(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.insert(Arc::new(strategy));
        self
    }

    pub fn insert(&mut self, strategy: Arc<dyn ExtractionStrategy>) {
        self.strategies.insert(strategy.method(), strategy);
    }

    pub fn get(&self, method: ExtractionMethod) -> Option<&Arc<dyn ExtractionStrategy>> {
        self.strategies.get(&method)
    }

}

/// Record of one strategy invocation.
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub method: ExtractionMethod,
    pub grids: Vec<TableGrid>,
    /// Parallel to `grids`.
    pub scores: Vec<f64>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl ExtractionAttempt {
    /// 0.0 when the attempt produced no grids.
    pub fn mean_confidence(&self) -> f64 {
        scoring::mean(&self.scores)
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Keep only grids whose score satisfies `keep`.
    pub fn retain_scores(&mut self, keep: impl Fn(f64) -> bool) {
        let (grids, scores) = self
            .grids
            .drain(..)
            .zip(self.scores.drain(..))
            .filter(|(_, s)| keep(*s))
            .unzip();
        self.grids = grids;
        self.scores = scores;
    }

    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            method: self.method,
            tables: self.grids.len(),
            mean_confidence: self.mean_confidence(),
            duration: self.duration,
            error: self.error.clone(),
        }
    }
}

/// Run `strategy` and score its grids, turning errors and panics into an
/// `error` string on the attempt instead of propagating them.
pub fn run_attempt(
    strategy: &dyn ExtractionStrategy,
    path: &Path,
    score: impl Fn(&TableGrid) -> f64,
) -> ExtractionAttempt {
    let method = strategy.method();
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| strategy.run(path)));
    let (grids, error) = match outcome {
        Ok(Ok(grids)) => (grids, None),
        Ok(Err(e)) => (Vec::new(), Some(e.to_string())),
        Err(payload) => (Vec::new(), Some(panic_message(payload.as_ref()))),
    };
    let scores = grids.iter().map(&score).collect();
    ExtractionAttempt {
        method,
        grids,
        scores,
        duration: start.elapsed(),
        error,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Shared post-processing: clean every grid and drop those with fewer than
/// `min_rows` rows.
pub(crate) fn finalize(grids: Vec<TableGrid>, min_rows: usize) -> Vec<TableGrid> {
    grids
        .into_iter()
        .map(TableGrid::cleaned)
        .filter(|g| !g.is_empty() && g.row_count() >= min_rows.max(2))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStrategy;

    fn grid(rows: &[Vec<&str>]) -> TableGrid {
        TableGrid::from_rows(rows, ExtractionMethod::Primary, Some(1))
    }

    #[test]
    fn run_attempt_scores_grids() {
        let strategy = MockStrategy::new(ExtractionMethod::Primary)
            .with_grids(vec![grid(&[vec!["a", "b"], vec!["1", "2"]])]);
        let attempt = run_attempt(&strategy, Path::new("x.pdf"), |_| 0.4);
        assert_eq!(attempt.scores, vec![0.4]);
        assert_eq!(attempt.mean_confidence(), 0.4);
        assert!(attempt.error.is_none());
    }

    #[test]
    fn run_attempt_captures_errors() {
        let strategy = MockStrategy::new(ExtractionMethod::Secondary).with_error("broken table");
        let attempt = run_attempt(&strategy, Path::new("x.pdf"), |_| 1.0);
        assert!(attempt.is_empty());
        assert_eq!(attempt.error.as_deref(), Some("broken table"));
        assert_eq!(attempt.mean_confidence(), 0.0);
    }

    #[test]
    fn run_attempt_captures_panics() {
        let strategy = MockStrategy::new(ExtractionMethod::Tertiary).panicking("boom");
        let attempt = run_attempt(&strategy, Path::new("x.pdf"), |_| 1.0);
        assert!(attempt.is_empty());
        assert!(attempt.error.unwrap().contains("boom"));
    }

    #[test]
    fn retain_scores_keeps_pairs_aligned() {
        let strategy = MockStrategy::new(ExtractionMethod::Enhanced).with_grids(vec![
            grid(&[vec!["a"], vec!["1"]]),
            grid(&[vec!["b"], vec!["2"]]),
        ]);
        let mut attempt = run_attempt(&strategy, Path::new("x.pdf"), |g| {
            if g.cell(0, 0) == Some("a") { 0.1 } else { 0.9 }
        });
        attempt.retain_scores(|s| s >= 0.3);
        assert_eq!(attempt.grids.len(), 1);
        assert_eq!(attempt.grids[0].cell(0, 0), Some("b"));
        assert_eq!(attempt.scores, vec![0.9]);
    }

    #[test]
    fn finalize_drops_short_grids() {
        let grids = vec![
            grid(&[vec!["only"]]),
            grid(&[vec!["a", "b"], vec!["", ""], vec!["1", "2"]]),
        ];
        let kept = finalize(grids, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].row_count(), 2);
    }

    #[test]
    fn registry_replaces_by_method() {
        let set = StrategySet::new()
            .with(MockStrategy::new(ExtractionMethod::Primary))
            .with(MockStrategy::new(ExtractionMethod::Primary).with_error("second"));
        let primary = set.get(ExtractionMethod::Primary).unwrap();
        assert!(primary.run(Path::new("doc.pdf")).is_err());
        assert!(set.get(ExtractionMethod::Secondary).is_none());
    }
}
