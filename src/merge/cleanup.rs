// src/merge/cleanup.rs
//
// Final normalization of the primary error type. Error cells frequently
// hold dump filenames, share links, or "OS crash ( ACF )" noise; this
// pass renders them as short readable failure names.

use once_cell::sync::Lazy;
use regex::Regex;

static CLEAN_NULLS: &[&str] = &["n/a", "na", "none", "unknown", ""];

static FILE_HINTS: &[&str] = &[".tar", ".gz", ".log", "http", "://"];

static EXTENSIONS: &[&str] = &[".tar.gz", ".tar", ".gz", ".log", ".txt", ".dump"];

static PAREN_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*([^)]+)\s*\)").unwrap());

/// Clean one error-type value. Values that already read as short plain
/// descriptions only get their whitespace collapsed; file names, links,
/// and parenthesized codes are rewritten to a canonical short form.
pub fn clean_error_text(value: &str) -> String {
    let lower = value.to_lowercase();
    if CLEAN_NULLS.contains(&lower.as_str()) {
        return "Unknown".to_string();
    }

    if value.chars().count() < 50 && !FILE_HINTS.iter().any(|h| lower.contains(h)) {
        return collapse_ws(value);
    }

    let mut cleaned = value.trim().to_string();
    for ext in EXTENSIONS {
        cleaned = cleaned.replace(ext, "");
    }

    let cleaned_lower = cleaned.to_lowercase();
    if cleaned_lower.contains("dump_") {
        return "System Dump".to_string();
    }
    if cleaned_lower.contains("afhc") {
        return "AFHC Error".to_string();
    }
    if cleaned_lower.contains("mce") {
        return "Machine Check Exception".to_string();
    }
    if cleaned_lower.contains("http") || cleaned.contains("://") {
        return "Diagnostic Link".to_string();
    }

    if let Some(caps) = PAREN_CODE.captures(&cleaned) {
        if let Some(code) = caps.get(1) {
            let code = code.as_str().trim();
            if code.chars().count() < 30 {
                return code.to_string();
            }
        }
    }

    let collapsed = collapse_ws(&cleaned);
    let truncated = if collapsed.chars().count() > 100 {
        let head: String = collapsed.chars().take(97).collect();
        format!("{head}...")
    } else {
        collapsed
    };

    if truncated.is_empty() {
        "Unknown".to_string()
    } else {
        truncated
    }
}

fn collapse_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
