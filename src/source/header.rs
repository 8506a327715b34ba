// src/source/header.rs
//
// Header-row detection and flattening for messy report sheets. Real uploads
// bury the header under title banners, split it across two merged rows, or
// omit it entirely, so the reader scans the first few rows for header-like
// text before deciding where data starts.

/// Words that make a cell look like a column header rather than data.
static HEADER_ROW_KEYWORDS: &[&str] = &[
    "serial", "sn", "number", "customer", "date", "status", "error", "failure", "ticket",
    "priority", "bios", "wafer", "faili", "ccd", "ttf", "ate", "slt", "tier", "platform", "mfg",
    "afhc", "ceslt", "osv", "diag", "charz", "repro", "kvm",
];

/// How many leading rows are considered as header candidates.
const HEADER_SCAN_ROWS: usize = 4;

/// Fraction of a row's cells that must look header-like.
const HEADER_CELL_RATIO: f64 = 0.3;

/// A grid split into flattened column names and data rows.
#[derive(Debug)]
pub struct HeaderSplit {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 0-based index into the original grid of the first data row.
    pub first_data_row: usize,
}

/// Canonical form of a column name for equality checks: trimmed, lowercased,
/// internal whitespace collapsed to single spaces. The original spelling is
/// always kept as the storage key; this form is only for comparisons.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Header parts that carry no information (blank cells, spreadsheet filler).
pub fn is_placeholder_part(part: &str) -> bool {
    let trimmed = part.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.to_lowercase().starts_with("unnamed")
}

/// Scan the first [`HEADER_SCAN_ROWS`] rows and return the indices of rows
/// where at least [`HEADER_CELL_RATIO`] of the grid's columns contain a
/// header keyword.
pub fn detect_header_rows(grid: &[Vec<String>]) -> Vec<usize> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return Vec::new();
    }
    let threshold = width as f64 * HEADER_CELL_RATIO;

    let mut header_rows = Vec::new();
    for (idx, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let header_like = row
            .iter()
            .filter(|cell| {
                let lower = cell.trim().to_lowercase();
                !lower.is_empty() && HEADER_ROW_KEYWORDS.iter().any(|kw| lower.contains(kw))
            })
            .count();
        if header_like as f64 >= threshold {
            header_rows.push(idx);
        }
    }
    header_rows
}

/// Split a raw cell grid into column names and data rows.
///
/// Multiple detected header rows are flattened per column by joining the
/// non-placeholder parts in row order with `" - "`, so a banner row over a
/// tier row yields names like `"Tier0 - Suzhou - L1"`. A single detected
/// header row is used as-is; with none detected, row 0 is assumed to be the
/// header. Data rows are padded to the grid width.
pub fn split_header_and_rows(grid: Vec<Vec<String>>) -> HeaderSplit {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    if grid.is_empty() || width == 0 {
        return HeaderSplit {
            columns: Vec::new(),
            rows: Vec::new(),
            first_data_row: 0,
        };
    }

    let mut header_rows = detect_header_rows(&grid);
    if header_rows.is_empty() {
        header_rows.push(0);
    }

    let columns: Vec<String> = (0..width)
        .map(|col| {
            let parts: Vec<&str> = header_rows
                .iter()
                .filter_map(|&r| grid[r].get(col))
                .map(|cell| cell.trim())
                .filter(|cell| !is_placeholder_part(cell))
                .collect();
            parts.join(" - ")
        })
        .collect();

    let first_data_row = header_rows.last().map(|&r| r + 1).unwrap_or(1);
    let rows: Vec<Vec<String>> = grid
        .into_iter()
        .skip(first_data_row)
        .map(|mut row| {
            row.resize(width, String::new());
            row
        })
        .collect();

    HeaderSplit {
        columns,
        rows,
        first_data_row,
    }
}
