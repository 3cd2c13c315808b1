//! Cell-level value inference shared by the scorer and table summaries.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)$").unwrap());

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}$").unwrap());

const CURRENCY_SYMBOLS: [char; 3] = ['$', '€', '£'];

/// Coarse type of a non-empty cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Integer,
    Decimal,
    Currency,
    Percent,
    Date,
    Text,
}

/// Parse a cell as a number, tolerating thousands separators, currency
/// symbols, percent signs and accounting-style parentheses.
pub fn parse_number(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (negative, inner) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = inner
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '%' && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    if !NUMBER_RE.is_match(&cleaned) {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

pub fn is_numeric(cell: &str) -> bool {
    parse_number(cell).is_some()
}

/// Infer the kind of a cell. Returns `None` for blank cells.
pub fn infer_kind(cell: &str) -> Option<CellKind> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    if DATE_RE.is_match(trimmed) {
        return Some(CellKind::Date);
    }
    if parse_number(trimmed).is_none() {
        return Some(CellKind::Text);
    }
    let kind = if trimmed.ends_with('%') {
        CellKind::Percent
    } else if trimmed.contains(CURRENCY_SYMBOLS) {
        CellKind::Currency
    } else if trimmed.contains('.') {
        CellKind::Decimal
    } else {
        CellKind::Integer
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formatted_numbers() {
        assert_eq!(parse_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_number("$ 99"), Some(99.0));
        assert_eq!(parse_number("(12.5)"), Some(-12.5));
        assert_eq!(parse_number("45%"), Some(45.0));
        assert_eq!(parse_number("-3"), Some(-3.0));
    }

    #[test]
    fn rejects_non_numbers() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("Total"), None);
    }

    #[test]
    fn infers_kinds() {
        assert_eq!(infer_kind("  "), None);
        assert_eq!(infer_kind("42"), Some(CellKind::Integer));
        assert_eq!(infer_kind("4.2"), Some(CellKind::Decimal));
        assert_eq!(infer_kind("€4.20"), Some(CellKind::Currency));
        assert_eq!(infer_kind("12%"), Some(CellKind::Percent));
        assert_eq!(infer_kind("2024-01-31"), Some(CellKind::Date));
        assert_eq!(infer_kind("Revenue"), Some(CellKind::Text));
    }
}
