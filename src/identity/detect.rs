// src/identity/detect.rs
//
// Identity-column detection. No schema is assumed: every column is scored
// on how much its header sounds like a serial-number column and how much
// its data looks like serial numbers, and the best combined score wins.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::source::RawTable;

/// Header keywords in priority order. The first three are the device
/// serial headers the reports use most; the next three are the barcode
/// variants; the rest are generic identifier names.
static HEADER_KEYWORDS: &[&str] = &[
    "cpu_sn",
    "cpu sn",
    "cpusn",
    "2d_barcode_sn",
    "2d_barcode",
    "2d",
    "sn",
    "serial",
    "barcode",
    "ppid",
    "serial_number",
    "serialnumber",
    "serial number",
    "part_id",
    "asset_id",
    "device_id",
    "rma",
    "system_sn",
    "system sn",
    "rma#",
    "rma #",
    "rma_number",
    "unit_sn",
    "unit sn",
    "device_sn",
    "device serial",
];

/// Column names that bypass scoring when their data looks plausible.
static PRIORITY_NAMES: &[&str] = &[
    "cpu_sn",
    "cpu sn",
    "cpusn",
    "2d_barcode_sn",
    "2d_barcode",
    "2d barcode",
];

/// Canonical serial shape: alphanumerics, underscore, numeric-dash-numeric.
static CANONICAL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[A-Z0-9]+_\d+-\d+$").unwrap());
/// Plain alphanumeric code of serial-ish length.
static PLAIN_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[A-Z0-9]{8,25}$").unwrap());
/// Alphanumeric with separators, slightly longer ceiling.
static EXTENDED_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[A-Z0-9_\-]{8,30}$").unwrap());

/// Minimum combined (or bypass data) score to accept a column.
pub const ACCEPT_THRESHOLD: f64 = 0.3;

const HEADER_WEIGHT: f64 = 0.4;
const DATA_WEIGHT: f64 = 0.6;

/// Header and data scores for one identity-column candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnScore {
    pub header: f64,
    pub data: f64,
}

impl ColumnScore {
    pub fn combined(&self) -> f64 {
        self.header * HEADER_WEIGHT + self.data * DATA_WEIGHT
    }
}

/// Score a column header against the keyword list. Exact matches score by
/// priority tier (1.5 / 1.3 / 1.0); partial containment scores by how much
/// of the name the keyword covers, tier-boosted and damped by 0.8.
pub fn score_header(column_name: &str) -> f64 {
    let col_lower = column_name.trim().to_lowercase();
    if col_lower.is_empty() {
        return 0.0;
    }

    for (idx, keyword) in HEADER_KEYWORDS.iter().enumerate() {
        if col_lower == *keyword {
            return if idx < 3 {
                1.5
            } else if idx < 6 {
                1.3
            } else {
                1.0
            };
        }
    }

    let mut max_score: f64 = 0.0;
    for (idx, keyword) in HEADER_KEYWORDS.iter().enumerate() {
        if col_lower.contains(keyword) {
            let mut score = keyword.len() as f64 / col_lower.len() as f64;
            if idx < 3 {
                score *= 1.2;
            } else if idx < 6 {
                score *= 1.1;
            }
            max_score = max_score.max(score * 0.8);
        }
    }
    max_score
}

/// Score column data by the share of sampled values matching each serial
/// shape, weighted 1.5 / 1.0 / 0.8. Only the first line of a multi-line
/// cell counts. Can exceed 1.0 when everything matches the canonical shape.
pub fn score_values<'a, I>(values: I, sample_limit: usize) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    let mut canonical = 0usize;
    let mut plain = 0usize;
    let mut extended = 0usize;
    let mut total = 0usize;

    for value in values.into_iter().take(sample_limit) {
        let first_line = value.lines().next().unwrap_or("").trim();
        total += 1;
        if CANONICAL_SHAPE.is_match(first_line) {
            canonical += 1;
        } else if PLAIN_SHAPE.is_match(first_line) {
            plain += 1;
        } else if EXTENDED_SHAPE.is_match(first_line) {
            extended += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    (canonical as f64 / total) * 1.5 + (plain as f64 / total) * 1.0 + (extended as f64 / total) * 0.8
}

/// Pick the identity column of a table, if any.
///
/// Reserved high-priority names win immediately when their data score
/// clears the threshold; otherwise the column with the best combined
/// score wins, provided it clears the same threshold.
pub fn detect_identity_column(table: &RawTable, sample_limit: usize) -> Option<usize> {
    if table.rows.is_empty() {
        return None;
    }

    for (idx, column) in table.columns.iter().enumerate() {
        let col_lower = column.trim().to_lowercase();
        if PRIORITY_NAMES.contains(&col_lower.as_str()) {
            let data = score_values(table.column_values(idx), sample_limit);
            if data >= ACCEPT_THRESHOLD {
                debug!(column = %column, data, "Priority identity column accepted");
                return Some(idx);
            }
        }
    }

    let mut best: Option<(usize, ColumnScore)> = None;
    for (idx, column) in table.columns.iter().enumerate() {
        let score = ColumnScore {
            header: score_header(column),
            data: score_values(table.column_values(idx), sample_limit),
        };
        match best {
            Some((_, current)) if score.combined() <= current.combined() => {}
            _ => best = Some((idx, score)),
        }
    }

    match best {
        Some((idx, score)) if score.combined() >= ACCEPT_THRESHOLD => {
            debug!(
                column = %table.columns[idx],
                header = score.header,
                data = score.data,
                combined = score.combined(),
                "Identity column detected"
            );
            Some(idx)
        }
        _ => None,
    }
}
