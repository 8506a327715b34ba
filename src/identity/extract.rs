// src/identity/extract.rs
//
// Serial extraction and validation for a single cell. Cells are messy:
// annotations after the serial, multi-line notes, legend rows, header rows
// echoed into the data. The extractor pulls the best serial-looking token
// out of the first line and a gate chain throws away everything that only
// pretends to be one.

use once_cell::sync::Lazy;
use regex::Regex;

/// Full canonical serial: 12-char device code, 3-digit family, 12-digit part.
static CANONICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9][A-Z0-9]{11}_\d{3}-\d{12}$").unwrap());

/// Loose serial search shape used when hunting inside free text.
static SEARCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][A-Z0-9]{9,}(?:_\d{3}(?:-\d{1,12})?)?").unwrap());

/// Minimum acceptable shape: digit-led run of at least ten alphanumerics.
static ACCEPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9][A-Z0-9]{9,}").unwrap());

static TOKEN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,;]+").unwrap());

/// Values that mean "no serial here".
static NULL_MARKERS: &[&str] = &["nan", "none", "", "null", "nat", "n/a", "na", "tbd", "tbc"];

/// Substrings that mark legend / annotation rows rather than devices.
static LEGEND_MARKERS: &[&str] = &[
    "key",
    "label",
    "legend",
    "reference",
    "note",
    "color",
    "prom",
    "degradation",
    "cov_",
    "nff",
    "esc",
    "description",
    "definition",
    "explanation",
];

/// Header names that sometimes leak into data rows.
static HEADER_ECHOES: &[&str] = &[
    "cpusn",
    "cpu0sn",
    "cpu1sn",
    "serialnumber",
    "serial",
    "barcode",
    "ppid",
    "systemsn",
    "rma",
    "assetid",
];

const MIN_TOKEN_LEN: usize = 10;
const TOKEN_ACCEPT_SCORE: i32 = 40;

/// Whole value matches the full canonical serial shape.
pub fn is_canonical(value: &str) -> bool {
    CANONICAL.is_match(value.trim())
}

/// Whole value starts with a digit-led alphanumeric run long enough to be
/// a serial. The floor for anything we will index an asset under.
pub fn is_acceptable(value: &str) -> bool {
    ACCEPT.is_match(value.trim())
}

pub fn first_line(cell: &str) -> &str {
    cell.lines().next().unwrap_or("").trim()
}

/// A serial-shaped run appears anywhere in the text. Cheaper than a full
/// extraction; used to pick representative sample rows.
pub fn contains_identity_shape(text: &str) -> bool {
    SEARCH.is_match(text)
}

fn token_score(token: &str) -> i32 {
    let len = token.chars().count();
    let mut score = 0;
    if token.starts_with('9') {
        score += 30;
    }
    if token.contains('_') {
        score += 20;
    }
    if token.contains('-') {
        score += 10;
    }
    if (13..=35).contains(&len) {
        score += 10;
    }
    let alnum = token.chars().filter(|c| c.is_alphanumeric()).count();
    if len > 0 && alnum as f64 / len as f64 > 0.8 {
        score += 10;
    }
    if SEARCH.is_match(token) {
        score += 30;
    }
    score
}

/// Pick the most serial-looking token out of free text. Tokens shorter
/// than ten chars never qualify; ties keep the earliest token.
pub fn best_token(text: &str) -> Option<&str> {
    let mut best: Option<&str> = None;
    let mut best_score = 0;
    for token in TOKEN_SPLIT.split(text) {
        if token.chars().count() < MIN_TOKEN_LEN {
            continue;
        }
        let score = token_score(token);
        if score >= TOKEN_ACCEPT_SCORE && score > best_score {
            best = Some(token);
            best_score = score;
        }
    }
    best
}

fn is_legend_value(value: &str) -> bool {
    let lower = value.to_lowercase();
    LEGEND_MARKERS.iter().any(|m| lower.contains(m))
}

fn is_header_echo(value: &str) -> bool {
    let squashed = value.to_lowercase().replace([' ', '_'], "");
    value.chars().count() < 20 && HEADER_ECHOES.iter().any(|h| squashed.contains(h))
}

/// Extract a validated identity from one cell, or nothing.
///
/// Only the first line is considered. A canonical value short-circuits;
/// otherwise the best token wins, falling back to the raw line when it is
/// itself acceptable. Whatever comes out must then survive the null,
/// legend, shape, and header-echo gates.
pub fn extract_identity(cell: &str) -> Option<&str> {
    let raw = first_line(cell);
    if is_canonical(raw) {
        return Some(raw);
    }

    let candidate = match best_token(raw) {
        Some(token) => token,
        None if is_acceptable(raw) => raw,
        None => return None,
    };

    if NULL_MARKERS.contains(&candidate.to_lowercase().as_str()) {
        return None;
    }
    if is_legend_value(candidate) {
        return None;
    }
    if !is_acceptable(candidate) {
        return None;
    }
    if is_header_echo(candidate) {
        return None;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_serial_extracts_to_itself() {
        let s = "9AB123456789_100-000000000001";
        assert!(is_canonical(s));
        assert_eq!(extract_identity(s), Some(s));
    }

    #[test]
    fn annotated_cell_yields_bare_serial() {
        assert_eq!(
            extract_identity("9MP2379P50008_100-000001463 SLT coverage patch"),
            Some("9MP2379P50008_100-000001463")
        );
    }

    #[test]
    fn multiline_cell_only_reads_first_line() {
        assert_eq!(
            extract_identity("9AMH711Q50057_100-000001359\nDue 9/18"),
            Some("9AMH711Q50057_100-000001359")
        );
    }

    #[test]
    fn ticket_ids_are_rejected() {
        // too short to tokenize and not digit-led
        assert_eq!(extract_identity("FARM-3602"), None);
    }

    #[test]
    fn letter_led_codes_fail_the_shape_gate() {
        assert_eq!(extract_identity("ABCD123456789012"), None);
    }

    #[test]
    fn null_markers_yield_nothing() {
        for marker in ["nan", "N/A", "TBD", ""] {
            assert_eq!(extract_identity(marker), None, "marker {marker:?}");
        }
    }

    #[test]
    fn legend_values_yield_nothing() {
        assert_eq!(extract_identity("COV_1234567890"), None);
        assert_eq!(extract_identity("9123456789NFF0"), None);
    }

    #[test]
    fn legend_gate_sees_the_token_not_the_line() {
        assert_eq!(
            extract_identity("9123456789 legend: red = fail"),
            Some("9123456789")
        );
    }

    #[test]
    fn header_echoes_yield_nothing() {
        assert_eq!(extract_identity("0123456789CPUSN"), None);
    }

    #[test]
    fn short_words_never_qualify_as_tokens() {
        assert_eq!(best_token("SLT patch due"), None);
    }

    #[test]
    fn first_of_equal_scoring_tokens_wins() {
        let cell = "9AB123456789_100-000000000001, 9CD123456789_100-000000000002";
        assert_eq!(best_token(cell), Some("9AB123456789_100-000000000001"));
    }

    #[test]
    fn acceptable_raw_line_survives_without_tokens() {
        // nine chars tokenizes to nothing, ten does and is digit-led
        assert_eq!(extract_identity("912345678"), None);
        assert_eq!(extract_identity("9123456789"), Some("9123456789"));
    }
}
