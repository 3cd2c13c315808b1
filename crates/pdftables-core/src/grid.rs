//! The rectangular cell grid shared by every extraction strategy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ExtractionMethod;
use crate::cell::{CellKind, infer_kind, is_numeric};

/// A table extracted from a document.
///
/// Rows are normalized to a rectangle on construction: short rows are padded
/// with empty cells up to the widest row. Whether the raw input was jagged is
/// remembered because accuracy-reporting techniques use it as a quality hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableGrid {
    rows: Vec<Vec<String>>,
    /// 1-based page number, if the technique knows it.
    page: Option<usize>,
    method: ExtractionMethod,
    /// Raw quality signal reported by the technique, in [0, 1].
    accuracy: Option<f64>,
    jagged: bool,
}

/// Shape and per-column content summary of a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub rows: usize,
    pub columns: usize,
    /// Distinct kinds seen in each column's body cells.
    pub column_kinds: Vec<Vec<CellKind>>,
    pub has_header: bool,
}

impl TableGrid {
    pub fn new(raw: Vec<Vec<String>>, method: ExtractionMethod, page: Option<usize>) -> Self {
        let width = raw.iter().map(Vec::len).max().unwrap_or(0);
        let jagged = raw.iter().any(|row| row.len() != width);
        let rows = raw
            .into_iter()
            .map(|row| {
                let mut cells: Vec<String> = row.iter().map(|c| normalize_cell(c)).collect();
                cells.resize(width, String::new());
                cells
            })
            .collect();
        Self {
            rows,
            page,
            method,
            accuracy: None,
            jagged,
        }
    }

    /// Convenience constructor from string slices.
    pub fn from_rows<S: AsRef<str>>(
        rows: &[Vec<S>],
        method: ExtractionMethod,
        page: Option<usize>,
    ) -> Self {
        let raw = rows
            .iter()
            .map(|r| r.iter().map(|c| c.as_ref().to_string()).collect())
            .collect();
        Self::new(raw, method, page)
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy.clamp(0.0, 1.0));
        self
    }

    /// Drop fully-empty rows and columns and collapse consecutive duplicate rows.
    pub fn cleaned(mut self) -> Self {
        self.rows.retain(|row| row.iter().any(|c| !c.is_empty()));

        let width = self.column_count();
        let keep: Vec<bool> = (0..width)
            .map(|col| self.rows.iter().any(|row| !row[col].is_empty()))
            .collect();
        if keep.iter().any(|k| !k) {
            for row in &mut self.rows {
                let mut col = 0;
                row.retain(|_| {
                    let kept = keep[col];
                    col += 1;
                    kept
                });
            }
        }

        self.rows.dedup();
        self
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.column_count() == 0
    }

    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    pub fn page(&self) -> Option<usize> {
        self.page
    }

    pub fn method(&self) -> ExtractionMethod {
        self.method
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    pub fn is_jagged(&self) -> bool {
        self.jagged
    }

    pub fn summary(&self) -> TableSummary {
        let columns = self.column_count();
        let column_kinds = (0..columns)
            .map(|col| {
                self.data_rows()
                    .iter()
                    .filter_map(|row| infer_kind(&row[col]))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .collect();
        let has_header = self.header().is_some_and(|header| {
            !header.is_empty()
                && header
                    .iter()
                    .all(|cell| !cell.is_empty() && !is_numeric(cell))
        });
        TableSummary {
            rows: self.row_count(),
            columns,
            column_kinds,
            has_header,
        }
    }
}

fn normalize_cell(cell: &str) -> String {
    cell.split_whitespace().collect::<Vec<_>>().join(" ")
}
