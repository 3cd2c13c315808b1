//! Geometric table detection over positioned words.
//!
//! Words are grouped into lines by vertical position, lines are split into
//! cells at wide horizontal gaps, and runs of consecutive multi-cell lines
//! become candidate tables. Two column models are supported:
//! - **Stream**: columns are the merged x-spans of the widest lines
//! - **Lattice**: columns are left-edge anchors shared by most lines; the
//!   fraction of cells sitting on an anchor is reported as accuracy

use serde::{Deserialize, Serialize};

use crate::backend::{BBox, TextToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Stream,
    Lattice,
}

/// Tunables for [`find_tables`]. Distances are in page units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    pub mode: DetectionMode,
    /// Max vertical distance between word centers on the same line.
    pub row_tolerance: f32,
    /// Min horizontal gap that separates two cells.
    pub column_gap: f32,
    pub min_rows: usize,
    pub min_columns: usize,
    /// Vertical gap, in median line heights, that ends a table.
    pub max_row_gap: f32,
    /// Lattice: max distance between a cell's left edge and its anchor.
    pub anchor_tolerance: f32,
    /// Lattice: min fraction of cells on an anchor for a table to be kept.
    pub min_alignment: f64,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Stream,
            row_tolerance: 3.0,
            column_gap: 12.0,
            min_rows: 2,
            min_columns: 2,
            max_row_gap: 2.0,
            anchor_tolerance: 4.0,
            min_alignment: 0.8,
        }
    }
}

impl TableSettings {
    /// Strict column-anchored detection for ruled or bordered tables.
    pub fn lattice() -> Self {
        Self {
            mode: DetectionMode::Lattice,
            column_gap: 8.0,
            ..Self::default()
        }
    }

    /// Gap-based detection with looser tolerances for dense tables.
    pub fn stream() -> Self {
        Self {
            row_tolerance: 4.0,
            column_gap: 8.0,
            max_row_gap: 3.0,
            ..Self::default()
        }
    }

    /// Most permissive preset, used by the enhanced fallback.
    pub fn relaxed() -> Self {
        Self {
            row_tolerance: 6.0,
            column_gap: 6.0,
            max_row_gap: 4.0,
            ..Self::default()
        }
    }

    /// Settings permutations tried by the enhanced fallback, in order.
    pub fn permutations() -> Vec<TableSettings> {
        vec![
            Self::default(),
            Self::lattice(),
            Self::stream(),
            Self::relaxed(),
        ]
    }

    pub fn with_min_rows(mut self, min_rows: usize) -> Self {
        self.min_rows = min_rows;
        self
    }
}

/// A candidate table found on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTable {
    pub rows: Vec<Vec<String>>,
    pub accuracy: Option<f64>,
    pub bbox: BBox,
}

#[derive(Debug, Clone)]
struct Cell {
    text: String,
    x0: f32,
    x1: f32,
}

impl Cell {
    fn center(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }
}

#[derive(Debug, Clone)]
struct Line {
    cells: Vec<Cell>,
    bbox: BBox,
}

/// Group tokens into rows by vertical center, each row sorted left to right.
///
/// A token joins the current row when its center is within `tolerance` of
/// the center of the row's first token.
pub fn group_rows(tokens: &[TextToken], tolerance: f32) -> Vec<Vec<&TextToken>> {
    let mut sorted: Vec<&TextToken> = tokens.iter().collect();
    sorted.sort_by(|a, b| {
        a.bbox
            .center_y()
            .total_cmp(&b.bbox.center_y())
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
    });

    let mut rows: Vec<Vec<&TextToken>> = Vec::new();
    let mut anchor = f32::NEG_INFINITY;
    for token in sorted {
        let y = token.bbox.center_y();
        match rows.last_mut() {
            Some(row) if (y - anchor).abs() <= tolerance => row.push(token),
            _ => {
                anchor = y;
                rows.push(vec![token]);
            }
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    }
    rows
}

/// Find candidate tables among one page's words.
pub fn find_tables(tokens: &[TextToken], settings: &TableSettings) -> Vec<DetectedTable> {
    let lines: Vec<Line> = group_rows(tokens, settings.row_tolerance)
        .into_iter()
        .filter_map(|row| split_cells(&row, settings.column_gap))
        .collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let line_height = median_height(&lines);
    let min_rows = settings.min_rows.max(2);

    table_blocks(&lines, line_height, settings)
        .into_iter()
        .filter(|block| block.len() >= min_rows)
        .filter_map(|block| match settings.mode {
            DetectionMode::Stream => build_stream(block, settings),
            DetectionMode::Lattice => build_lattice(block, settings),
        })
        .collect()
}

fn split_cells(row: &[&TextToken], column_gap: f32) -> Option<Line> {
    let first = row.first()?;
    let mut bbox = first.bbox;
    let mut cells: Vec<Cell> = Vec::new();
    for token in row {
        bbox = bbox.union(&token.bbox);
        match cells.last_mut() {
            Some(cell) if token.bbox.x0 - cell.x1 < column_gap => {
                cell.text.push(' ');
                cell.text.push_str(&token.text);
                cell.x1 = cell.x1.max(token.bbox.x1);
            }
            _ => cells.push(Cell {
                text: token.text.clone(),
                x0: token.bbox.x0,
                x1: token.bbox.x1,
            }),
        }
    }
    Some(Line { cells, bbox })
}

fn median_height(lines: &[Line]) -> f32 {
    let mut heights: Vec<f32> = lines
        .iter()
        .map(|l| l.bbox.height())
        .filter(|h| *h > 0.0)
        .collect();
    if heights.is_empty() {
        return 10.0;
    }
    heights.sort_by(|a, b| a.total_cmp(b));
    heights[heights.len() / 2]
}

/// Split lines into runs of consecutive multi-cell lines without large
/// vertical gaps.
fn table_blocks<'a>(
    lines: &'a [Line],
    line_height: f32,
    settings: &TableSettings,
) -> Vec<&'a [Line]> {
    let min_columns = settings.min_columns.max(2);
    let max_gap = settings.max_row_gap * line_height;

    let mut blocks = Vec::new();
    let mut start: Option<usize> = None;
    for (i, line) in lines.iter().enumerate() {
        let tabular = line.cells.len() >= min_columns;
        let continues = match start {
            Some(_) if i > 0 => tabular && line.bbox.y0 - lines[i - 1].bbox.y1 <= max_gap,
            _ => false,
        };
        match (start, tabular, continues) {
            (Some(_), _, true) => {}
            (Some(s), _, false) => {
                blocks.push(&lines[s..i]);
                start = tabular.then_some(i);
            }
            (None, true, _) => start = Some(i),
            (None, false, _) => {}
        }
    }
    if let Some(s) = start {
        blocks.push(&lines[s..]);
    }
    blocks
}

fn block_bbox(block: &[Line]) -> BBox {
    block
        .iter()
        .skip(1)
        .fold(block[0].bbox, |acc, line| acc.union(&line.bbox))
}

fn build_stream(block: &[Line], settings: &TableSettings) -> Option<DetectedTable> {
    let widest = block.iter().map(|l| l.cells.len()).max()?;
    let mut spans: Vec<(f32, f32)> = block
        .iter()
        .filter(|l| l.cells.len() == widest)
        .flat_map(|l| l.cells.iter().map(|c| (c.x0, c.x1)))
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut columns: Vec<(f32, f32)> = Vec::new();
    for (x0, x1) in spans {
        match columns.last_mut() {
            Some(last) if x0 <= last.1 => last.1 = last.1.max(x1),
            _ => columns.push((x0, x1)),
        }
    }
    if columns.len() < settings.min_columns.max(2) {
        return None;
    }

    let rows = block
        .iter()
        .map(|line| {
            let mut row = vec![String::new(); columns.len()];
            for cell in &line.cells {
                let idx = nearest_column(&columns, cell.center());
                append_cell(&mut row[idx], &cell.text);
            }
            row
        })
        .collect();

    Some(DetectedTable {
        rows,
        accuracy: None,
        bbox: block_bbox(block),
    })
}

fn build_lattice(block: &[Line], settings: &TableSettings) -> Option<DetectedTable> {
    let tol = settings.anchor_tolerance;

    // Cluster left edges, remembering which lines contribute to each cluster.
    let mut edges: Vec<(f32, usize)> = block
        .iter()
        .enumerate()
        .flat_map(|(i, l)| l.cells.iter().map(move |c| (c.x0, i)))
        .collect();
    edges.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut clusters: Vec<(f32, Vec<usize>)> = Vec::new();
    for (x, line) in edges {
        match clusters.last_mut() {
            Some((anchor, lines)) if x - *anchor <= tol => lines.push(line),
            _ => clusters.push((x, vec![line])),
        }
    }

    let quorum = block.len().div_ceil(2);
    let anchors: Vec<f32> = clusters
        .into_iter()
        .filter(|(_, lines)| {
            let mut distinct = lines.clone();
            distinct.dedup();
            distinct.len() >= quorum
        })
        .map(|(anchor, _)| anchor)
        .collect();
    if anchors.len() < settings.min_columns.max(2) {
        return None;
    }

    let total_cells: usize = block.iter().map(|l| l.cells.len()).sum();
    let aligned = block
        .iter()
        .flat_map(|l| l.cells.iter())
        .filter(|c| anchors.iter().any(|a| (c.x0 - a).abs() <= tol))
        .count();
    let accuracy = aligned as f64 / total_cells.max(1) as f64;
    if accuracy < settings.min_alignment {
        return None;
    }

    let rows = block
        .iter()
        .map(|line| {
            let mut row = vec![String::new(); anchors.len()];
            for cell in &line.cells {
                let idx = anchors
                    .iter()
                    .rposition(|a| *a - tol <= cell.x0)
                    .unwrap_or(0);
                append_cell(&mut row[idx], &cell.text);
            }
            row
        })
        .collect();

    Some(DetectedTable {
        rows,
        accuracy: Some(accuracy),
        bbox: block_bbox(block),
    })
}

fn nearest_column(columns: &[(f32, f32)], x: f32) -> usize {
    columns
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| distance(**a, x).total_cmp(&distance(**b, x)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn distance((x0, x1): (f32, f32), x: f32) -> f32 {
    if x < x0 {
        x0 - x
    } else if x > x1 {
        x - x1
    } else {
        0.0
    }
}

fn append_cell(slot: &mut String, text: &str) {
    if !slot.is_empty() {
        slot.push(' ');
    }
    slot.push_str(text);
}
