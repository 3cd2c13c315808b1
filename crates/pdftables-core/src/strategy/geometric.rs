//! Strategies built on word positions from the [`PdfBackend`].

use std::path::Path;
use std::sync::Arc;

use crate::backend::PdfBackend;
use crate::cell::is_numeric;
use crate::grid::TableGrid;
use crate::layout::{self, TableSettings};
use crate::scoring::{self, ScoringWeights, grid_confidence};
use crate::strategy::{ExtractionStrategy, StrategyError, finalize};
use crate::ExtractionMethod;

/// Run `settings` over every page and collect the detected grids.
fn detect_pages(
    backend: &dyn PdfBackend,
    path: &Path,
    method: ExtractionMethod,
    settings: &TableSettings,
) -> Result<Vec<TableGrid>, StrategyError> {
    let pages = backend.page_count(path)?;
    let mut grids = Vec::new();
    for page in 1..=pages {
        let words = match backend.page_words(path, page) {
            Ok(words) => words,
            Err(e) => {
                tracing::warn!(method = %method, page, error = %e, "skipping page");
                continue;
            }
        };
        for table in layout::find_tables(&words, settings) {
            let grid = TableGrid::new(table.rows, method, Some(page));
            grids.push(match table.accuracy {
                Some(accuracy) => grid.with_accuracy(accuracy),
                None => grid,
            });
        }
    }
    Ok(grids)
}

/// General-purpose stream detection with default settings.
pub struct PrimaryStrategy {
    backend: Arc<dyn PdfBackend>,
    min_rows: usize,
}

impl PrimaryStrategy {
    pub fn new(backend: Arc<dyn PdfBackend>, min_rows: usize) -> Self {
        Self { backend, min_rows }
    }
}

impl ExtractionStrategy for PrimaryStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Primary
    }

    fn run(&self, path: &Path) -> Result<Vec<TableGrid>, StrategyError> {
        let settings = TableSettings::default().with_min_rows(self.min_rows);
        let grids = detect_pages(self.backend.as_ref(), path, self.method(), &settings)?;
        Ok(finalize(grids, self.min_rows))
    }
}

/// Column-anchored detection, falling back to stream detection when no
/// page has an aligned table.
pub struct SecondaryStrategy {
    backend: Arc<dyn PdfBackend>,
    min_rows: usize,
}

impl SecondaryStrategy {
    pub fn new(backend: Arc<dyn PdfBackend>, min_rows: usize) -> Self {
        Self { backend, min_rows }
    }
}

impl ExtractionStrategy for SecondaryStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Secondary
    }

    fn run(&self, path: &Path) -> Result<Vec<TableGrid>, StrategyError> {
        let lattice = TableSettings::lattice().with_min_rows(self.min_rows);
        let grids = finalize(
            detect_pages(self.backend.as_ref(), path, self.method(), &lattice)?,
            self.min_rows,
        );
        if !grids.is_empty() {
            return Ok(grids);
        }
        tracing::debug!(path = %path.display(), "no aligned tables, retrying as stream");
        let stream = TableSettings::stream().with_min_rows(self.min_rows);
        let grids = detect_pages(self.backend.as_ref(), path, self.method(), &stream)?;
        Ok(finalize(grids, self.min_rows))
    }
}

/// Loose gap-based detection for dense numeric tables. Two-line headers are
/// merged into one row.
pub struct TertiaryStrategy {
    backend: Arc<dyn PdfBackend>,
    min_rows: usize,
}

impl TertiaryStrategy {
    pub fn new(backend: Arc<dyn PdfBackend>, min_rows: usize) -> Self {
        Self { backend, min_rows }
    }
}

impl ExtractionStrategy for TertiaryStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Tertiary
    }

    fn run(&self, path: &Path) -> Result<Vec<TableGrid>, StrategyError> {
        let settings = TableSettings::stream().with_min_rows(self.min_rows);
        let grids = detect_pages(self.backend.as_ref(), path, self.method(), &settings)?
            .into_iter()
            .map(merge_header_rows)
            .collect();
        Ok(finalize(grids, self.min_rows))
    }
}

/// Merge row 1 into row 0 when row 0 is a partial label row and row 1 is
/// all labels, e.g. a header wrapped over two lines.
fn merge_header_rows(grid: TableGrid) -> TableGrid {
    let rows = grid.rows();
    if rows.len() < 3 {
        return grid;
    }
    let (first, second) = (&rows[0], &rows[1]);
    let first_partial = first.iter().any(String::is_empty) && first.iter().any(|c| !c.is_empty());
    let second_labels = second.iter().all(|c| c.is_empty() || !is_numeric(c))
        && second.iter().any(|c| !c.is_empty());
    if !first_partial || !second_labels {
        return grid;
    }

    let merged: Vec<String> = first
        .iter()
        .zip(second)
        .map(|(a, b)| match (a.is_empty(), b.is_empty()) {
            (true, _) => b.clone(),
            (false, true) => a.clone(),
            (false, false) => format!("{a} {b}"),
        })
        .collect();
    let mut raw = vec![merged];
    raw.extend(rows[2..].iter().cloned());
    TableGrid::new(raw, grid.method(), grid.page())
}

/// Primary detection retried under several settings permutations; the
/// permutation with the best mean score among surviving grids wins.
pub struct EnhancedStrategy {
    backend: Arc<dyn PdfBackend>,
    min_rows: usize,
    weights: ScoringWeights,
    min_confidence: f64,
}

impl EnhancedStrategy {
    pub fn new(
        backend: Arc<dyn PdfBackend>,
        min_rows: usize,
        weights: ScoringWeights,
        min_confidence: f64,
    ) -> Self {
        Self {
            backend,
            min_rows,
            weights,
            min_confidence,
        }
    }
}

impl ExtractionStrategy for EnhancedStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Enhanced
    }

    fn run(&self, path: &Path) -> Result<Vec<TableGrid>, StrategyError> {
        let mut best: Option<(f64, Vec<TableGrid>)> = None;
        for settings in TableSettings::permutations() {
            let settings = settings.with_min_rows(self.min_rows);
            let grids = finalize(
                detect_pages(self.backend.as_ref(), path, self.method(), &settings)?,
                self.min_rows,
            );
            let (survivors, scores): (Vec<TableGrid>, Vec<f64>) = grids
                .into_iter()
                .map(|g| {
                    let score = grid_confidence(&g, &self.weights);
                    (g, score)
                })
                .filter(|(_, score)| *score >= self.min_confidence)
                .unzip();
            if survivors.is_empty() {
                continue;
            }
            let mean = scoring::mean(&scores);
            tracing::debug!(mode = ?settings.mode, tables = survivors.len(), mean, "enhanced permutation");
            if best.as_ref().is_none_or(|(b, _)| mean > *b) {
                best = Some((mean, survivors));
            }
        }
        Ok(best.map(|(_, grids)| grids).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BBox, TextToken};
    use crate::mock::MockBackend;

    fn word(text: &str, x: f32, y: f32, page: usize) -> TextToken {
        TextToken::new(text, BBox::new(x, y, x + text.len() as f32 * 5.0, y + 10.0), page)
    }

    fn table_page(rows: &[&[&str]], page: usize) -> Vec<TextToken> {
        let mut words = Vec::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, text) in row.iter().enumerate() {
                if !text.is_empty() {
                    words.push(word(text, 20.0 + c as f32 * 100.0, 100.0 + r as f32 * 14.0, page));
                }
            }
        }
        words
    }

    fn sales_rows() -> Vec<&'static [&'static str]> {
        vec![
            &["Region", "Units", "Revenue"],
            &["North", "120", "1200.50"],
            &["South", "98", "980.00"],
            &["East", "143", "1430.25"],
        ]
    }

    #[test]
    fn primary_extracts_per_page() {
        let backend = MockBackend::new()
            .with_page("", table_page(&sales_rows(), 1))
            .with_page("", Vec::new());
        let strategy = PrimaryStrategy::new(Arc::new(backend), 2);
        let grids = strategy.run(Path::new("doc.pdf")).unwrap();
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].page(), Some(1));
        assert_eq!(grids[0].method(), ExtractionMethod::Primary);
        assert_eq!(grids[0].row_count(), 4);
    }

    #[test]
    fn secondary_reports_accuracy() {
        let backend = MockBackend::new().with_page("", table_page(&sales_rows(), 1));
        let strategy = SecondaryStrategy::new(Arc::new(backend), 2);
        let grids = strategy.run(Path::new("doc.pdf")).unwrap();
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].accuracy(), Some(1.0));
    }

    #[test]
    fn unreadable_document_is_an_error() {
        let backend = MockBackend::new().failing_open();
        let strategy = PrimaryStrategy::new(Arc::new(backend), 2);
        assert!(matches!(
            strategy.run(Path::new("doc.pdf")),
            Err(StrategyError::Backend(_))
        ));
    }

    #[test]
    fn failing_page_is_skipped() {
        let backend = MockBackend::new()
            .with_page("", table_page(&sales_rows(), 1))
            .with_failing_page()
            .with_page("", table_page(&sales_rows(), 3));
        let strategy = PrimaryStrategy::new(Arc::new(backend), 2);
        let grids = strategy.run(Path::new("doc.pdf")).unwrap();
        let pages: Vec<_> = grids.iter().map(|g| g.page()).collect();
        assert_eq!(pages, vec![Some(1), Some(3)]);
    }

    #[test]
    fn header_rows_merge() {
        let grid = TableGrid::from_rows(
            &[
                vec!["", "Q1", "Q2"],
                vec!["Region", "Sales", "Sales"],
                vec!["North", "1", "2"],
            ],
            ExtractionMethod::Tertiary,
            Some(1),
        );
        let merged = merge_header_rows(grid);
        assert_eq!(merged.row_count(), 2);
        assert_eq!(merged.rows()[0], vec!["Region", "Q1 Sales", "Q2 Sales"]);
    }

    #[test]
    fn complete_header_is_not_merged() {
        let grid = TableGrid::from_rows(
            &[vec!["A", "B"], vec!["x", "y"], vec!["1", "2"]],
            ExtractionMethod::Tertiary,
            Some(1),
        );
        assert_eq!(merge_header_rows(grid).row_count(), 3);
    }

    #[test]
    fn enhanced_returns_best_surviving_permutation() {
        let backend = MockBackend::new().with_page("", table_page(&sales_rows(), 1));
        let strategy =
            EnhancedStrategy::new(Arc::new(backend), 2, ScoringWeights::default(), 0.3);
        let grids = strategy.run(Path::new("doc.pdf")).unwrap();
        assert_eq!(grids.len(), 1);
        assert!(grids.iter().all(|g| g.method() == ExtractionMethod::Enhanced));
    }

    #[test]
    fn enhanced_with_unreachable_bar_is_empty() {
        let backend = MockBackend::new().with_page("", table_page(&sales_rows(), 1));
        let strategy =
            EnhancedStrategy::new(Arc::new(backend), 2, ScoringWeights::default(), 1.1);
        assert!(strategy.run(Path::new("doc.pdf")).unwrap().is_empty());
    }
}
