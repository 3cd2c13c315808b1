//! The fallback cascade.
//!
//! A request walks `NotStarted → PrimaryOrdering → Fallbacks → Ocr → Done`.
//! Strategies run one at a time; the first one whose grids clear its bar
//! wins and nothing after it is invoked. A checkpoint before every attempt
//! enforces the time budget and cancellation.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::backend::PdfBackend;
use crate::config::ExtractionConfig;
use crate::ocr::{OCR_UPGRADE_NOTE, OcrService, TesseractOcr};
use crate::scoring::grid_confidence;
use crate::selector::MethodSelector;
use crate::strategy::{ExtractionAttempt, ExtractionStrategy, OcrStrategy, StrategySet, run_attempt};
use crate::{AttemptSummary, ExtractError, ExtractionMethod, Outcome, PrivilegeTier, ResultAggregate};

/// Added when every strategy, including the fallbacks, came up empty.
pub const NO_TABLES_NOTE: &str = "No tables found with any extraction method (including fallbacks)";

pub const CANCELLED_NOTE: &str = "Extraction cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    PrimaryOrdering,
    Fallbacks,
    Ocr,
}

/// Runs the cascade for one document at a time. Holds no per-request state,
/// so one extractor can serve many requests.
pub struct TableExtractor {
    config: ExtractionConfig,
    strategies: StrategySet,
    selector: Option<MethodSelector>,
    ocr: Option<Arc<dyn OcrService>>,
}

impl TableExtractor {
    /// An extractor over an explicit strategy set, without a selector or OCR.
    pub fn new(config: ExtractionConfig, strategies: StrategySet) -> Self {
        Self {
            config,
            strategies,
            selector: None,
            ocr: None,
        }
    }

    /// The full stack on one backend: the standard strategies, the page-1
    /// selector and Tesseract OCR.
    pub fn with_backend(backend: Arc<dyn PdfBackend>, config: ExtractionConfig) -> Self {
        let strategies = StrategySet::standard(backend.clone(), &config);
        let selector = MethodSelector::new(backend.clone(), config.selector.clone());
        let ocr = TesseractOcr::new(backend, config.ocr.clone());
        Self::new(config, strategies)
            .with_selector(selector)
            .with_ocr(Arc::new(ocr))
    }

    pub fn with_selector(mut self, selector: MethodSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrService>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// The ordered strategies for `path`: the selector's pick, then the
    /// configured default order without duplicates.
    pub fn ordering(&self, path: &Path) -> Vec<ExtractionMethod> {
        let mut order = Vec::with_capacity(self.config.default_order.len() + 1);
        if let Some(selector) = &self.selector {
            order.push(selector.select(path));
        }
        for method in &self.config.default_order {
            if !order.contains(method) {
                order.push(*method);
            }
        }
        order
    }

    /// Extract tables from `path`.
    ///
    /// A missing file is the only error; every strategy failure, the time
    /// budget and cancellation are reported through the aggregate's
    /// outcome and warnings.
    pub fn extract(
        &self,
        path: &Path,
        tier: PrivilegeTier,
        cancel: Option<&CancellationToken>,
    ) -> Result<ResultAggregate, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }
        let mut cascade = Cascade {
            extractor: self,
            path,
            cancel,
            start: Instant::now(),
            warnings: Vec::new(),
            attempts: Vec::new(),
            best: None,
            halted: None,
        };
        let winner = cascade.run(tier);
        Ok(cascade.finish(winner))
    }
}

/// Mutable state of one request.
struct Cascade<'a> {
    extractor: &'a TableExtractor,
    path: &'a Path,
    cancel: Option<&'a CancellationToken>,
    start: Instant,
    warnings: Vec<String>,
    attempts: Vec<AttemptSummary>,
    /// Best attempt that produced grids without clearing its bar.
    best: Option<ExtractionAttempt>,
    halted: Option<Outcome>,
}

impl Cascade<'_> {
    fn run(&mut self, tier: PrivilegeTier) -> Option<ExtractionAttempt> {
        let extractor = self.extractor;
        let config = &extractor.config;
        let score = |g: &crate::TableGrid| grid_confidence(g, &config.scoring_weights);

        self.enter(Stage::PrimaryOrdering);
        for method in extractor.ordering(self.path) {
            let Some(strategy) = extractor.strategies.get(method) else {
                tracing::debug!(method = %method, "no strategy registered, skipping");
                continue;
            };
            if !self.checkpoint(method) {
                return None;
            }
            let attempt = self.attempt(strategy.as_ref(), method.as_str(), score);
            let mean = attempt.mean_confidence();
            if attempt.is_empty() {
                continue;
            }
            if mean >= config.confidence_threshold {
                return Some(attempt);
            }
            tracing::warn!(method = %method, confidence = mean, "{} confidence too low: {:.3}", method, mean);
            self.consider(attempt);
        }

        self.enter(Stage::Fallbacks);
        if let Some(strategy) = extractor.strategies.get(ExtractionMethod::Enhanced) {
            if !self.checkpoint(ExtractionMethod::Enhanced) {
                return None;
            }
            let mut attempt = self.attempt(strategy.as_ref(), "enhanced", score);
            attempt.retain_scores(|s| s >= config.enhanced_min_confidence);
            if !attempt.is_empty() {
                return Some(attempt);
            }
        }

        if let Some(strategy) = extractor.strategies.get(ExtractionMethod::TextHeuristic) {
            if !self.checkpoint(ExtractionMethod::TextHeuristic) {
                return None;
            }
            let penalized = |g: &crate::TableGrid| score(g) * config.text_heuristic_penalty;
            let attempt = self.attempt(strategy.as_ref(), "text_heuristic", penalized);
            if !attempt.is_empty() {
                if attempt.mean_confidence() >= config.text_heuristic_min_confidence {
                    return Some(attempt);
                }
                self.consider(attempt);
            }
        }

        let service = extractor.ocr.as_ref()?;
        if !self.checkpoint(ExtractionMethod::Ocr) {
            return None;
        }
        self.enter(Stage::Ocr);
        let scanned = service.is_scanned(self.path).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "scan check failed, assuming scanned");
            true
        });
        if !scanned {
            return None;
        }
        if !tier.allows_ocr() {
            tracing::info!(path = %self.path.display(), tier = %tier, "scanned document, OCR not available for tier");
            self.warnings.push(OCR_UPGRADE_NOTE.to_string());
            return None;
        }

        let strategy = OcrStrategy::new(service.clone(), tier);
        let attempt = self.attempt(&strategy, "OCR processing failed", |_| config.ocr_confidence);
        (!attempt.is_empty()).then_some(attempt)
    }

    fn enter(&self, stage: Stage) {
        tracing::debug!(path = %self.path.display(), stage = ?stage, "cascade stage");
    }

    /// Returns false, recording why, when the cascade must halt before `next`.
    fn checkpoint(&mut self, next: ExtractionMethod) -> bool {
        if self.cancel.is_some_and(|c| c.is_cancelled()) {
            tracing::info!(path = %self.path.display(), next = %next, "extraction cancelled");
            self.warnings.push(CANCELLED_NOTE.to_string());
            self.halted = Some(Outcome::Cancelled);
            return false;
        }
        let budget = self.extractor.config.time_budget;
        let elapsed = self.start.elapsed();
        if elapsed >= budget {
            tracing::warn!(
                path = %self.path.display(),
                next = %next,
                elapsed_ms = elapsed.as_millis() as u64,
                "time budget exhausted"
            );
            self.warnings
                .push(format!("Processing timeout after {}s", budget.as_secs_f64()));
            self.halted = Some(Outcome::TimedOut);
            return false;
        }
        tracing::debug!(next = %next, elapsed_ms = elapsed.as_millis() as u64, "checkpoint passed");
        true
    }

    /// Run one strategy; failures become a `"{label}: {error}"` warning.
    fn attempt(
        &mut self,
        strategy: &dyn ExtractionStrategy,
        label: &str,
        score: impl Fn(&crate::TableGrid) -> f64,
    ) -> ExtractionAttempt {
        let attempt = run_attempt(strategy, self.path, score);
        if let Some(error) = &attempt.error {
            tracing::warn!(method = %attempt.method, error = %error, "strategy failed");
            self.warnings.push(format!("{label}: {error}"));
        } else {
            tracing::debug!(
                method = %attempt.method,
                tables = attempt.grids.len(),
                confidence = attempt.mean_confidence(),
                duration_ms = attempt.duration.as_millis() as u64,
                "strategy finished"
            );
        }
        self.attempts.push(attempt.summary());
        attempt
    }

    /// Keep `attempt` if it beats the best under-bar attempt so far.
    fn consider(&mut self, attempt: ExtractionAttempt) {
        let better = self
            .best
            .as_ref()
            .is_none_or(|best| attempt.mean_confidence() > best.mean_confidence());
        if better {
            self.best = Some(attempt);
        }
    }

    fn finish(mut self, winner: Option<ExtractionAttempt>) -> ResultAggregate {
        let threshold = self.extractor.config.confidence_threshold;
        let (chosen, outcome) = match (winner, self.best.take(), self.halted) {
            (Some(w), _, _) => (Some(w), Outcome::Success),
            (None, Some(best), Some(halt)) => (Some(best), halt),
            (None, Some(best), None) => {
                self.warnings.push(format!(
                    "Best result ({}) has confidence {:.3}, below threshold {}",
                    best.method,
                    best.mean_confidence(),
                    threshold
                ));
                (Some(best), Outcome::LowConfidence)
            }
            (None, None, Some(halt)) => (None, halt),
            (None, None, None) => {
                self.warnings.push(NO_TABLES_NOTE.to_string());
                (None, Outcome::Empty)
            }
        };

        let processing_time = self.start.elapsed();
        match &chosen {
            Some(a) => tracing::info!(
                path = %self.path.display(),
                method = %a.method,
                tables = a.grids.len(),
                confidence = a.mean_confidence(),
                outcome = ?outcome,
                "extraction finished"
            ),
            None => tracing::info!(path = %self.path.display(), outcome = ?outcome, "extraction finished without tables"),
        }

        let (tables, confidence_scores, method) = match chosen {
            Some(a) => (a.grids, a.scores, Some(a.method)),
            None => (Vec::new(), Vec::new(), None),
        };
        ResultAggregate {
            tables,
            confidence_scores,
            method,
            outcome,
            processing_time,
            warnings: self.warnings,
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOcr, MockStrategy};
    use crate::TableGrid;

    fn strong_grid(method: ExtractionMethod) -> TableGrid {
        TableGrid::from_rows(
            &[
                vec!["Region", "Units", "Revenue"],
                vec!["North", "120", "1,200.50"],
                vec!["South", "98", "980.00"],
                vec!["East", "143", "1,430.25"],
                vec!["West", "77", "770.10"],
            ],
            method,
            Some(1),
        )
    }

    fn weak_grid(method: ExtractionMethod) -> TableGrid {
        TableGrid::from_rows(
            &[
                vec!["x", "", "", ""],
                vec!["", "", "", ""],
                vec!["", "", "", ""],
            ],
            method,
            Some(1),
        )
    }

    fn existing_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    #[test]
    fn missing_file_is_an_error() {
        let extractor = TableExtractor::new(ExtractionConfig::default(), StrategySet::new());
        let err = extractor
            .extract(Path::new("/nonexistent/doc.pdf"), PrivilegeTier::Free, None)
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(_)));
    }

    #[test]
    fn ordering_puts_selection_first_without_duplicates() {
        let config = ExtractionConfig::default();
        let extractor = TableExtractor::new(config, StrategySet::new());
        assert_eq!(
            extractor.ordering(Path::new("x.pdf")),
            ExtractionMethod::STANDARD.to_vec()
        );
    }

    #[test]
    fn under_bar_attempt_is_returned_as_low_confidence() {
        let file = existing_file();
        let set = StrategySet::new()
            .with(MockStrategy::new(ExtractionMethod::Primary).with_grids(vec![weak_grid(ExtractionMethod::Primary)]));
        let extractor = TableExtractor::new(ExtractionConfig::default(), set);
        let result = extractor.extract(file.path(), PrivilegeTier::Free, None).unwrap();
        assert_eq!(result.outcome, Outcome::LowConfidence);
        assert_eq!(result.method, Some(ExtractionMethod::Primary));
        assert_eq!(result.total_tables(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("below threshold")));
    }

    #[test]
    fn strategy_errors_become_warnings() {
        let file = existing_file();
        let set = StrategySet::new()
            .with(MockStrategy::new(ExtractionMethod::Primary).with_error("corrupt xref"))
            .with(MockStrategy::new(ExtractionMethod::Secondary).with_grids(vec![strong_grid(ExtractionMethod::Secondary)]));
        let extractor = TableExtractor::new(ExtractionConfig::default(), set);
        let result = extractor.extract(file.path(), PrivilegeTier::Free, None).unwrap();
        assert_eq!(result.method, Some(ExtractionMethod::Secondary));
        assert_eq!(result.warnings, vec!["primary: corrupt xref".to_string()]);
        assert_eq!(result.attempts.len(), 2);
    }

    #[test]
    fn enhanced_drops_grids_under_its_bar() {
        let file = existing_file();
        let set = StrategySet::new().with(
            MockStrategy::new(ExtractionMethod::Enhanced).with_grids(vec![
                weak_grid(ExtractionMethod::Enhanced),
                strong_grid(ExtractionMethod::Enhanced),
            ]),
        );
        let extractor = TableExtractor::new(ExtractionConfig::default(), set);
        let result = extractor.extract(file.path(), PrivilegeTier::Free, None).unwrap();
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.method, Some(ExtractionMethod::Enhanced));
        assert_eq!(result.total_tables(), 1);
    }

    #[test]
    fn text_heuristic_scores_are_penalized() {
        let file = existing_file();
        let set = StrategySet::new().with(
            MockStrategy::new(ExtractionMethod::TextHeuristic)
                .with_grids(vec![strong_grid(ExtractionMethod::TextHeuristic)]),
        );
        let extractor = TableExtractor::new(ExtractionConfig::default(), set);
        let result = extractor.extract(file.path(), PrivilegeTier::Free, None).unwrap();
        assert_eq!(result.method, Some(ExtractionMethod::TextHeuristic));
        assert!((result.confidence_scores[0] - 0.7).abs() < 1e-9);
    }

    #[test]
    fn ocr_failure_is_reported() {
        let file = existing_file();
        let ocr = Arc::new(MockOcr::new(true).with_error("tesseract missing"));
        let extractor = TableExtractor::new(ExtractionConfig::default(), StrategySet::new()).with_ocr(ocr);
        let result = extractor.extract(file.path(), PrivilegeTier::Paid, None).unwrap();
        assert_eq!(result.outcome, Outcome::Empty);
        assert!(result.warnings[0].starts_with("OCR processing failed: "));
        assert_eq!(result.warnings.last().map(String::as_str), Some(NO_TABLES_NOTE));
    }

    #[test]
    fn failed_scan_check_counts_as_scanned() {
        let file = existing_file();
        let ocr = Arc::new(MockOcr::new(false).failing_scan_check());
        let extractor = TableExtractor::new(ExtractionConfig::default(), StrategySet::new()).with_ocr(ocr);
        let result = extractor.extract(file.path(), PrivilegeTier::Free, None).unwrap();
        assert!(result.warnings.contains(&OCR_UPGRADE_NOTE.to_string()));
    }

    #[test]
    fn digital_documents_skip_ocr() {
        let file = existing_file();
        let ocr = Arc::new(MockOcr::new(false));
        let extractor =
            TableExtractor::new(ExtractionConfig::default(), StrategySet::new()).with_ocr(ocr.clone());
        let result = extractor.extract(file.path(), PrivilegeTier::Paid, None).unwrap();
        assert_eq!(ocr.scan_calls(), 1);
        assert_eq!(ocr.extract_calls(), 0);
        assert_eq!(result.warnings, vec![NO_TABLES_NOTE.to_string()]);
    }

    #[test]
    fn cancelled_token_halts_before_first_attempt() {
        let file = existing_file();
        let primary = Arc::new(MockStrategy::new(ExtractionMethod::Primary));
        let mut set = StrategySet::new();
        set.insert(primary.clone());
        let extractor = TableExtractor::new(ExtractionConfig::default(), set);
        let token = CancellationToken::new();
        token.cancel();
        let result = extractor.extract(file.path(), PrivilegeTier::Free, Some(&token)).unwrap();
        assert_eq!(result.outcome, Outcome::Cancelled);
        assert_eq!(primary.call_count(), 0);
        assert_eq!(result.warnings, vec![CANCELLED_NOTE.to_string()]);
    }
}
