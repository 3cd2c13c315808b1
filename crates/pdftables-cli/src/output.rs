use std::io::Write;

use owo_colors::OwoColorize;
use pdftables_core::{ExtractError, ExtractionMethod, Outcome, ResultAggregate, TableGrid};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Cells longer than this are shortened in terminal output.
const MAX_CELL_WIDTH: usize = 32;

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "success",
        Outcome::LowConfidence => "low confidence",
        Outcome::Empty => "no tables",
        Outcome::TimedOut => "timed out",
        Outcome::Cancelled => "cancelled",
    }
}

fn method_label(method: Option<ExtractionMethod>) -> String {
    method
        .map(|m| m.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Print a full extraction result: header line, each table, then warnings.
pub fn print_result(
    w: &mut dyn Write,
    file_name: &str,
    result: &ResultAggregate,
    color: ColorMode,
) -> std::io::Result<()> {
    let headline = format!(
        "{}: {} table(s) via {} in {:.2}s ({})",
        file_name,
        result.total_tables(),
        method_label(result.method),
        result.processing_secs(),
        outcome_label(result.outcome)
    );
    if color.enabled() {
        match result.outcome {
            Outcome::Success => writeln!(w, "{}", headline.bold().green())?,
            Outcome::LowConfidence | Outcome::TimedOut => writeln!(w, "{}", headline.bold().yellow())?,
            Outcome::Empty | Outcome::Cancelled => writeln!(w, "{}", headline.bold().red())?,
        }
    } else {
        writeln!(w, "{}", headline)?;
    }
    writeln!(w)?;

    for (i, (grid, confidence)) in result
        .tables
        .iter()
        .zip(&result.confidence_scores)
        .enumerate()
    {
        print_table(w, i + 1, grid, *confidence, color)?;
        writeln!(w)?;
    }

    print_warnings(w, &result.warnings, color)
}

/// Print one table as aligned columns with a rule under the header row.
pub fn print_table(
    w: &mut dyn Write,
    index: usize,
    grid: &TableGrid,
    confidence: f64,
    color: ColorMode,
) -> std::io::Result<()> {
    let page = grid
        .page()
        .map(|p| format!("page {}", p))
        .unwrap_or_else(|| "page ?".to_string());
    let title = format!(
        "Table {} ({}, {}x{}, confidence {:.3})",
        index,
        page,
        grid.row_count(),
        grid.column_count(),
        confidence
    );
    if color.enabled() {
        writeln!(w, "{}", title.cyan())?;
    } else {
        writeln!(w, "{}", title)?;
    }

    let rows: Vec<Vec<String>> = grid
        .rows()
        .iter()
        .map(|row| row.iter().map(|c| shorten(c)).collect())
        .collect();
    let widths: Vec<usize> = (0..grid.column_count())
        .map(|col| {
            rows.iter()
                .map(|r| r[col].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    for (r, row) in rows.iter().enumerate() {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ");
        if r == 0 && color.enabled() {
            writeln!(w, "  {}", line.bold())?;
        } else {
            writeln!(w, "  {}", line)?;
        }
        if r == 0 {
            let rule = widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("-+-");
            writeln!(w, "  {}", rule)?;
        }
    }
    Ok(())
}

fn shorten(cell: &str) -> String {
    if cell.chars().count() > MAX_CELL_WIDTH {
        let head: String = cell.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        cell.to_string()
    }
}

pub fn print_warnings(w: &mut dyn Write, warnings: &[String], color: ColorMode) -> std::io::Result<()> {
    for warning in warnings {
        if color.enabled() {
            writeln!(w, "{} {}", "warning:".yellow().bold(), warning)?;
        } else {
            writeln!(w, "warning: {}", warning)?;
        }
    }
    Ok(())
}

/// One summary line per file in batch mode.
pub fn print_batch_line(
    w: &mut dyn Write,
    file_name: &str,
    result: &Result<ResultAggregate, ExtractError>,
    color: ColorMode,
) -> std::io::Result<()> {
    match result {
        Ok(r) => {
            let line = format!(
                "{:<40} {:>3} table(s)  {:<14} conf {:.3}  {:.2}s  {}",
                file_name,
                r.total_tables(),
                method_label(r.method),
                r.mean_confidence(),
                r.processing_secs(),
                outcome_label(r.outcome)
            );
            if color.enabled() && !r.is_success() {
                writeln!(w, "{}", line.yellow())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
        Err(e) => {
            if color.enabled() {
                writeln!(w, "{:<40} {}", file_name, format!("error: {}", e).red())?;
            } else {
                writeln!(w, "{:<40} error: {}", file_name, e)?;
            }
        }
    }
    Ok(())
}

pub fn print_batch_summary(
    w: &mut dyn Write,
    results: &[(String, Result<ResultAggregate, ExtractError>)],
    color: ColorMode,
) -> std::io::Result<()> {
    let succeeded = results
        .iter()
        .filter(|(_, r)| r.as_ref().is_ok_and(|a| a.is_success()))
        .count();
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    let tables: usize = results
        .iter()
        .filter_map(|(_, r)| r.as_ref().ok())
        .map(|a| a.total_tables())
        .sum();
    let summary = format!(
        "{} file(s): {} succeeded, {} without confident tables, {} failed; {} table(s) total",
        results.len(),
        succeeded,
        results.len() - succeeded - failed,
        failed,
        tables
    );
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", summary.bold())?;
    } else {
        writeln!(w, "{}", summary)?;
    }
    Ok(())
}

/// Print the selector's pick, which heads `ordering`, and the full cascade order.
pub fn print_selection(
    w: &mut dyn Write,
    file_name: &str,
    ordering: &[ExtractionMethod],
) -> std::io::Result<()> {
    let first = ordering.first().copied().unwrap_or(ExtractionMethod::Primary);
    writeln!(w, "{}: first strategy {}", file_name, first)?;
    let order = ordering
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" -> ");
    writeln!(w, "ordering: {} -> enhanced -> text_heuristic -> ocr", order)?;
    Ok(())
}
