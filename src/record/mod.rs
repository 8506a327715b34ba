// src/record/mod.rs
//
// Turns one table row into a DraftRecord: a validated identity plus
// everything the merger needs to fold the row into a canonical asset.
// Rows without a valid identity produce nothing.

pub mod customer;

use tracing::debug;

use crate::classify::{Classification, ColumnRole};
use crate::identity;
use crate::source::RawTable;

pub use customer::{customer_from_filename, is_valid_customer_value};

/// Error-column values that mean "no error recorded".
static ERROR_NULLS: &[&str] = &["n/a", "na", "none"];

/// Error-column values containing these are file or link references, not
/// error descriptions.
static ERROR_FILE_MARKERS: &[&str] = &[".tar", ".gz", ".log", "http://", "https://"];

/// Tier cell values that do not count as a failure.
static TIER_CLEAR: &[&str] = &["PASS", "PASSED", "NFF", "NFT", "NOT RUN", "N/A", "NA"];

/// Tier cell values that count as an explicit pass for status inference.
static TIER_PASS: &[&str] = &["PASS", "PASSED", "NFF", "NFT"];

/// Tier cell values that count as neither pass nor failure.
static TIER_SKIP: &[&str] = &["NOT RUN", "N/A", "NA"];

#[derive(Debug, Clone)]
pub struct RowOrigin {
    pub file: String,
    pub sheet: String,
    /// 1-based row in the source sheet or slide.
    pub row: usize,
}

#[derive(Debug, Clone)]
pub struct RowField {
    pub column: String,
    pub value: String,
    pub role: ColumnRole,
}

#[derive(Debug, Clone)]
pub struct ErrorCandidate {
    pub text: String,
    /// Column name, `"<col> (extracted)"`, or `"tier:<col>"`.
    pub source: String,
}

/// Everything one valid row contributes to its asset.
#[derive(Debug, Clone)]
pub struct DraftRecord {
    pub identity: String,
    pub origin: RowOrigin,
    /// Column the identity was read from.
    pub identity_column: String,
    /// Filename-derived customer carried for end-of-run backfill.
    pub customer_hint: Option<String>,
    /// Candidate error descriptions, best first.
    pub error_candidates: Vec<ErrorCandidate>,
    /// First failing tier column, set only when the row has no error
    /// candidates at all.
    pub tier_failure: Option<String>,
    pub explicit_status: Option<String>,
    /// Tier-derived status, set only when the table has no status column.
    pub inferred_status: Option<&'static str>,
    pub fields: Vec<RowField>,
    pub diagnostics: Vec<(String, String)>,
}

/// Per-file context shared by every row of that file.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub filename: &'a str,
    pub customer_hint: Option<&'a str>,
    pub classification: &'a Classification,
    /// Error descriptions at or over this length are treated as prose
    /// and rejected as the primary error type.
    pub max_error_len: usize,
}

/// Build a draft from one row, or `None` when the identity cell does not
/// survive extraction and validation.
pub fn build_draft(
    table: &RawTable,
    row_idx: usize,
    identity_col: usize,
    ctx: &RowContext,
) -> Option<DraftRecord> {
    let row = table.rows.get(row_idx)?;
    let raw_cell = row.get(identity_col).map(String::as_str).unwrap_or("");
    let identity = identity::extract_identity(raw_cell)?;
    let identity_column = table
        .columns
        .get(identity_col)
        .cloned()
        .unwrap_or_default();

    let mut error_candidates = Vec::new();

    // A column flagged for error extraction holds identity and error text
    // in the same cell. Whatever remains after removing the identity is
    // the error description.
    if ctx.classification.error_extraction_column.as_deref() == Some(identity_column.as_str()) {
        if let Some(text) = extracted_error_text(identity::first_line(raw_cell), identity) {
            debug!(column = %identity_column, error = %text, "Extracted error from identity cell");
            error_candidates.push(ErrorCandidate {
                text,
                source: format!("{identity_column} (extracted)"),
            });
        }
    }

    let mut fields = Vec::new();
    let mut diagnostics = Vec::new();
    let mut tier_cells: Vec<(&str, &str)> = Vec::new();
    let mut explicit_status: Option<String> = None;
    let mut has_status_column = false;

    for (idx, column) in table.columns.iter().enumerate() {
        if column.trim().is_empty() {
            continue;
        }
        let value = row.get(idx).map(|v| v.trim()).unwrap_or("");
        let role = ctx.classification.role_of(column);

        match role {
            ColumnRole::ErrorType => {
                if !value.is_empty() && !ERROR_NULLS.contains(&value.to_lowercase().as_str()) {
                    let lower = value.to_lowercase();
                    let is_file = ERROR_FILE_MARKERS.iter().any(|m| lower.contains(m));
                    if !is_file && value.chars().count() < ctx.max_error_len {
                        error_candidates.push(ErrorCandidate {
                            text: value.to_string(),
                            source: column.clone(),
                        });
                    }
                }
            }
            ColumnRole::Diagnostic => {
                if !value.is_empty() {
                    diagnostics.push((column.clone(), value.to_string()));
                }
            }
            ColumnRole::TestTier => tier_cells.push((column, value)),
            ColumnRole::Status => {
                // only the first status column carries the status
                if !has_status_column {
                    has_status_column = true;
                    if !value.is_empty() {
                        explicit_status = Some(value.to_string());
                    }
                }
            }
            _ => {}
        }

        if !value.is_empty() {
            fields.push(RowField {
                column: column.clone(),
                value: value.to_string(),
                role,
            });
        }
    }

    let tier_failure = if error_candidates.is_empty() {
        tier_cells
            .iter()
            .find(|(_, value)| is_tier_failure(value))
            .map(|(col, _)| col.to_string())
    } else {
        None
    };

    let inferred_status = if !has_status_column && !tier_cells.is_empty() {
        infer_tier_status(&tier_cells)
    } else {
        None
    };

    Some(DraftRecord {
        identity: identity.to_string(),
        origin: RowOrigin {
            file: ctx.filename.to_string(),
            sheet: table.origin.sheet.clone(),
            row: table.sheet_row(row_idx),
        },
        identity_column,
        customer_hint: ctx.customer_hint.map(str::to_string),
        error_candidates,
        tier_failure,
        explicit_status,
        inferred_status,
        fields,
        diagnostics,
    })
}

fn extracted_error_text(raw_line: &str, identity: &str) -> Option<String> {
    let without = raw_line.replace(identity, "");
    let trimmed = without
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '-' | '_' | ':' | ';'));
    if trimmed.chars().count() > 3 {
        Some(trimmed.to_string())
    } else {
        None
    }
}

fn is_tier_failure(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let upper = value.to_uppercase();
    if TIER_CLEAR.contains(&upper.as_str()) {
        return false;
    }
    !upper.starts_with("NFF") && !upper.starts_with("NFT")
}

fn infer_tier_status(tier_cells: &[(&str, &str)]) -> Option<&'static str> {
    let mut has_any = false;
    let mut has_failure = false;
    let mut has_pass = false;
    for (_, value) in tier_cells {
        if value.is_empty() {
            continue;
        }
        has_any = true;
        let upper = value.to_uppercase();
        if TIER_PASS.contains(&upper.as_str()) {
            has_pass = true;
        } else if !TIER_SKIP.contains(&upper.as_str()) {
            has_failure = true;
        }
    }
    if !has_any {
        return None;
    }
    Some(if has_failure {
        "Failed"
    } else if has_pass {
        "Passed"
    } else {
        "Not Run"
    })
}
