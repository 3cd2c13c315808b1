//! Confidence scoring for extracted tables.
//!
//! A grid's confidence is a weighted sum of independent quality terms, each
//! capped at its own budget so that no single term can dominate:
//! - `completeness`: fraction of non-empty cells
//! - `structure`: fixed bonuses for minimum viable and well-formed shapes
//! - `uniqueness`: fraction of distinct rows (penalizes repeated boilerplate)
//! - `numeric`: fraction of columns holding numbers
//! - `header`: first row looks like column labels
//! - `consistency`: fraction of columns with a narrow set of value kinds
//!
//! The scorer is pure: it depends only on the grid and the weights.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cell::{infer_kind, is_numeric};
use crate::grid::TableGrid;

/// Returned when the weighted sum cannot be computed meaningfully.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Weights for the scoring function.
///
/// `completeness` scales the fill ratio; every other field is the maximum
/// contribution of its term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub completeness: f64,
    pub structure_basic: f64,
    pub structure_well_formed: f64,
    pub uniqueness: f64,
    pub numeric: f64,
    pub header: f64,
    pub consistency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            completeness: 0.7,
            structure_basic: 0.1,
            structure_well_formed: 0.05,
            uniqueness: 0.08,
            numeric: 0.05,
            header: 0.03,
            consistency: 0.04,
        }
    }
}

/// Share of row-0 cells that must be non-numeric labels for the header bonus.
const HEADER_LABEL_RATIO: f64 = 0.7;

/// Distinct value kinds a column may hold and still count as consistent.
const MAX_KINDS_PER_COLUMN: usize = 2;

/// Score a grid in [0, 1]. Grids with fewer than two rows or no columns
/// score 0.0.
pub fn score_grid(grid: &TableGrid, weights: &ScoringWeights) -> f64 {
    let rows = grid.row_count();
    let cols = grid.column_count();
    if rows < 2 || cols == 0 {
        return 0.0;
    }

    let total = weights.completeness * completeness(grid)
        + structure(rows, cols, weights)
        + (uniqueness(grid) * weights.uniqueness).min(weights.uniqueness)
        + (numeric_column_ratio(grid) * weights.numeric).min(weights.numeric)
        + if looks_like_header(grid) { weights.header } else { 0.0 }
        + (consistent_column_ratio(grid) * weights.consistency).min(weights.consistency);

    if !total.is_finite() {
        return NEUTRAL_SCORE;
    }
    round3(total.clamp(0.0, 1.0))
}

/// Confidence for a grid whose technique reported its own accuracy.
///
/// The accuracy is the starting point; well-formed shapes earn small bonuses.
pub fn refine_accuracy(grid: &TableGrid, accuracy: f64) -> f64 {
    let mut confidence = accuracy;
    if grid.row_count() >= 3 {
        confidence += 0.1;
    }
    if !grid.is_jagged() {
        confidence += 0.1;
    }
    if !confidence.is_finite() {
        return NEUTRAL_SCORE;
    }
    round3(confidence.clamp(0.0, 1.0))
}

/// Confidence of a grid: refined accuracy when the technique supplied one,
/// otherwise the common scorer.
pub fn grid_confidence(grid: &TableGrid, weights: &ScoringWeights) -> f64 {
    match grid.accuracy() {
        Some(accuracy) => refine_accuracy(grid, accuracy),
        None => score_grid(grid, weights),
    }
}

/// Arithmetic mean, 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn completeness(grid: &TableGrid) -> f64 {
    let total = grid.row_count() * grid.column_count();
    let filled = grid
        .rows()
        .iter()
        .flatten()
        .filter(|cell| !cell.is_empty())
        .count();
    filled as f64 / total as f64
}

fn structure(rows: usize, cols: usize, weights: &ScoringWeights) -> f64 {
    let mut score = 0.0;
    if rows >= 3 && cols >= 2 {
        score += weights.structure_basic;
    }
    if rows >= 5 && cols >= 3 {
        score += weights.structure_well_formed;
    }
    score
}

fn uniqueness(grid: &TableGrid) -> f64 {
    let distinct: HashSet<&Vec<String>> = grid.rows().iter().collect();
    distinct.len() as f64 / grid.row_count() as f64
}

/// Fraction of columns where at least half of the non-empty body cells
/// parse as numbers.
fn numeric_column_ratio(grid: &TableGrid) -> f64 {
    let cols = grid.column_count();
    let numeric = (0..cols)
        .filter(|&col| {
            let values: Vec<&str> = grid
                .data_rows()
                .iter()
                .map(|row| row[col].as_str())
                .filter(|cell| !cell.is_empty())
                .collect();
            !values.is_empty() && values.iter().filter(|v| is_numeric(v)).count() * 2 >= values.len()
        })
        .count();
    numeric as f64 / cols as f64
}

fn looks_like_header(grid: &TableGrid) -> bool {
    let Some(header) = grid.header() else {
        return false;
    };
    let labels = header
        .iter()
        .filter(|cell| !cell.is_empty() && !is_numeric(cell))
        .count();
    labels as f64 >= header.len() as f64 * HEADER_LABEL_RATIO
}

fn consistent_column_ratio(grid: &TableGrid) -> f64 {
    let cols = grid.column_count();
    let consistent = (0..cols)
        .filter(|&col| {
            let kinds: HashSet<_> = grid
                .rows()
                .iter()
                .filter_map(|row| infer_kind(&row[col]))
                .collect();
            !kinds.is_empty() && kinds.len() <= MAX_KINDS_PER_COLUMN
        })
        .count();
    consistent as f64 / cols as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExtractionMethod;

    fn grid(rows: &[Vec<&str>]) -> TableGrid {
        TableGrid::from_rows(rows, ExtractionMethod::Primary, Some(1))
    }

    fn numeric_table() -> Vec<Vec<&'static str>> {
        vec![
            vec!["Region", "Units", "Revenue"],
            vec!["North", "120", "1,200.50"],
            vec!["South", "98", "980.00"],
            vec!["East", "143", "1,430.25"],
            vec!["West", "77", "770.10"],
        ]
    }

    #[test]
    fn test_scoring_weights_default_budget() {
        let w = ScoringWeights::default();
        let max = w.completeness
            + w.structure_basic
            + w.structure_well_formed
            + w.uniqueness
            + w.numeric
            + w.header
            + w.consistency;
        assert!((max - 1.05).abs() < 1e-9, "max raw score: {}", max);
    }

    #[test]
    fn test_empty_grids_score_zero() {
        let w = ScoringWeights::default();
        assert_eq!(score_grid(&grid(&[]), &w), 0.0);
        assert_eq!(score_grid(&grid(&[vec![]]), &w), 0.0);
        assert_eq!(score_grid(&grid(&[vec!["only", "row"]]), &w), 0.0);
        assert_eq!(score_grid(&grid(&[vec![], vec![]]), &w), 0.0);
    }

    #[test]
    fn test_full_numeric_table_scores_high() {
        let score = score_grid(&grid(&numeric_table()), &ScoringWeights::default());
        assert_eq!(score, 1.0, "clamped full score expected: {}", score);
    }

    #[test]
    fn test_blanked_table_scores_lower() {
        let full = numeric_table();
        let mut blanked = full.clone();
        // Blank 12 of 15 cells (80%).
        let mut blanked_count = 0;
        for row in blanked.iter_mut() {
            for cell in row.iter_mut() {
                if blanked_count < 12 {
                    *cell = "";
                    blanked_count += 1;
                }
            }
        }
        let w = ScoringWeights::default();
        let full_score = score_grid(&grid(&full), &w);
        let blank_score = score_grid(&grid(&blanked), &w);
        assert!(
            full_score > blank_score,
            "full {} should beat blanked {}",
            full_score,
            blank_score
        );
    }

    #[test]
    fn test_duplicate_rows_reduce_uniqueness() {
        let base = numeric_table();
        let mut doubled = base.clone();
        doubled.extend(base.clone());
        let w = ScoringWeights::default();
        let base_grid = grid(&base);
        let doubled_grid = grid(&doubled);
        assert!(uniqueness(&doubled_grid) < uniqueness(&base_grid));
        assert!((uniqueness(&doubled_grid) - 0.5).abs() < 1e-9);

        // Isolate the uniqueness term with a weight set that zeroes the rest.
        let only_unique = ScoringWeights {
            completeness: 0.0,
            structure_basic: 0.0,
            structure_well_formed: 0.0,
            numeric: 0.0,
            header: 0.0,
            consistency: 0.0,
            ..w
        };
        assert!(score_grid(&doubled_grid, &only_unique) < score_grid(&base_grid, &only_unique));
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let w = ScoringWeights::default();
        let samples: Vec<Vec<Vec<&str>>> = vec![
            vec![vec!["a"], vec!["b"]],
            vec![vec!["", ""], vec!["", ""]],
            vec![vec!["1", "2"], vec!["3"], vec!["x", "y", "z"]],
            numeric_table(),
        ];
        for rows in samples {
            let s = score_grid(&grid(&rows), &w);
            assert!((0.0..=1.0).contains(&s), "out of range: {}", s);
        }
    }

    #[test]
    fn test_scorer_is_deterministic() {
        let w = ScoringWeights::default();
        let rows = vec![
            vec!["Item", "Qty"],
            vec!["Widget", ""],
            vec!["Gadget", "3"],
        ];
        let a = score_grid(&grid(&rows), &w);
        let b = score_grid(&grid(&rows), &w);
        assert_eq!(a, b);
    }

    #[test]
    fn test_header_bonus_requires_labels() {
        let labelled = grid(&[vec!["Name", "Score"], vec!["a", "1"], vec!["b", "2"]]);
        let numeric_first = grid(&[vec!["1", "2"], vec!["a", "1"], vec!["b", "2"]]);
        assert!(looks_like_header(&labelled));
        assert!(!looks_like_header(&numeric_first));
    }

    #[test]
    fn test_refine_accuracy_bonuses() {
        let g = grid(&numeric_table());
        assert_eq!(refine_accuracy(&g, 0.5), 0.7);
        let jagged = grid(&[vec!["a", "b"], vec!["1"]]);
        assert_eq!(refine_accuracy(&jagged, 0.5), 0.5);
        assert_eq!(refine_accuracy(&g, 0.95), 1.0);
    }

    #[test]
    fn test_grid_confidence_prefers_accuracy() {
        let w = ScoringWeights::default();
        let g = grid(&numeric_table()).with_accuracy(0.4);
        assert_eq!(grid_confidence(&g, &w), 0.6);
        let plain = grid(&numeric_table());
        assert_eq!(grid_confidence(&plain, &w), score_grid(&plain, &w));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[0.2, 0.4]) - 0.3).abs() < 1e-12);
    }
}
