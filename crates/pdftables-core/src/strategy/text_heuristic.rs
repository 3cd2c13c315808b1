//! Last-resort table recovery from raw page text.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backend::PdfBackend;
use crate::grid::TableGrid;
use crate::strategy::{ExtractionStrategy, StrategyError, finalize};
use crate::ExtractionMethod;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").unwrap());

/// Candidate delimiters, tried in order; ties keep the earlier one.
const DELIMITERS: [&str; 5] = ["\t", "   ", "  ", "|", ","];

const MIN_TABLE_LINES: usize = 3;
const MIN_LINE_LEN: usize = 10;

pub struct TextHeuristicStrategy {
    backend: Arc<dyn PdfBackend>,
    min_rows: usize,
}

impl TextHeuristicStrategy {
    pub fn new(backend: Arc<dyn PdfBackend>, min_rows: usize) -> Self {
        Self { backend, min_rows }
    }
}

impl ExtractionStrategy for TextHeuristicStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::TextHeuristic
    }

    fn run(&self, path: &Path) -> Result<Vec<TableGrid>, StrategyError> {
        let pages = self.backend.page_count(path)?;
        let mut grids = Vec::new();
        for page in 1..=pages {
            let text = match self.backend.page_text(path, page) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(method = %self.method(), page, error = %e, "skipping page");
                    continue;
                }
            };
            if let Some(rows) = parse_text_table(&text) {
                grids.push(TableGrid::new(rows, self.method(), Some(page)));
            }
        }
        Ok(finalize(grids, self.min_rows))
    }
}

/// Whether a line of text plausibly belongs to a table: it has two or more
/// numbers, two or more separators, or a currency symbol, and is longer than
/// a short label.
pub fn looks_like_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.chars().count() <= MIN_LINE_LEN {
        return false;
    }
    let numbers = NUMBER_RE.find_iter(line).count();
    let separators = line.matches('\t').count() + line.matches("  ").count() + line.matches('|').count();
    let currency = line.chars().any(|c| matches!(c, '$' | '€' | '£'));
    numbers >= 2 || separators >= 2 || currency
}

/// Parse a page's text into rows, using the first table-like line as the
/// header. Returns `None` when fewer than three lines look tabular or no
/// delimiter yields at least two columns on average.
pub fn parse_text_table(text: &str) -> Option<Vec<Vec<String>>> {
    let lines: Vec<&str> = text.lines().filter(|l| looks_like_table_row(l)).collect();
    if lines.len() < MIN_TABLE_LINES {
        return None;
    }

    let mut best: Option<(&str, f64)> = None;
    for delimiter in DELIMITERS {
        let total: usize = lines.iter().map(|l| l.split(delimiter).count()).sum();
        let average = total as f64 / lines.len() as f64;
        if best.is_none_or(|(_, b)| average > b) {
            best = Some((delimiter, average));
        }
    }
    let (delimiter, average) = best?;
    if average < 2.0 {
        return None;
    }

    let parsed: Vec<Vec<String>> = lines
        .iter()
        .map(|line| {
            line.split(delimiter)
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();
    if parsed.len() < 2 {
        return None;
    }

    let width = parsed[0].len();
    let rows = parsed
        .into_iter()
        .map(|mut row| {
            row.resize(width, String::new());
            row
        })
        .collect();
    Some(rows)
}
