// src/record/customer.rs
//
// Customer-value hygiene. Customer columns in these reports are routinely
// polluted with error codes, tier names, ODM names, and placeholder text,
// so a value has to look like an actual end customer before it is kept.

use once_cell::sync::Lazy;
use regex::Regex;

/// Substrings that disqualify a value as a customer name: status codes,
/// error vocabulary, test stages, placeholders, ODM/OEM manufacturers,
/// and product line names.
static NON_CUSTOMER_TOKENS: &[&str] = &[
    "RMA", "FA", "NFF", "TBD", "TBC", "N/A", "NA", "NONE", "NULL", "UNKNOWN", "ERR", "ERROR",
    "FAIL", "PARITY", "HANG", "CRASH", "WDT", "TIMEOUT", "STRESS", "ACF", "CORR", "UNCORR", "ECC",
    "MCE", "WHEA", "ATE", "SLT", "OSV", "CESLT", "L1", "L2", "FT1", "FT2", "TEST", "DEBUG",
    "SAMPLE", "INTERNAL", "DEMO", "HUAQIN", "WISTRON", "FOXCONN", "QUANTA", "COMPAL", "INVENTEC",
    "PEGATRON", "FLEX", "JABIL", "CELESTICA", "SUPER MICRO", "SUPERMICRO", "TURIN", "GENOA",
    "BERGAMO", "SIENA", "MILAN", "ROME", "NAPLES", "EPYC", "RYZEN", "THREADRIPPER", "ZEN",
];

/// Names that always pass once the deny list is clear.
static KNOWN_CUSTOMERS: &[&str] = &[
    "TENCENT",
    "ALIBABA",
    "UNIT",
    "HUAWEI",
    "BAIDU",
    "BYTEDANCE",
    "MICROSOFT",
    "GOOGLE",
    "AMAZON",
    "META",
    "ORACLE",
    "IBM",
    "DELL",
    "HP",
    "HPE",
    "LENOVO",
    "SUPERMICRO",
    "CISCO",
];

/// Customer spellings recognized inside filenames.
static FILENAME_CUSTOMERS: &[&str] = &[
    "Tencent",
    "Alibaba",
    "Meta",
    "Google",
    "Microsoft",
    "Amazon",
    "Facebook",
    "ByteDance",
    "Baidu",
    "Huawei",
    "Intel",
    "AMD",
];

/// First filename words that are report vocabulary, not customers.
static GENERIC_FIRST_WORDS: &[&str] = &[
    "summary", "tracker", "report", "status", "data", "fa", "dppm",
];

static FIRST_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z]+)[\s_\-]").unwrap());

/// True when a value plausibly names an end customer.
///
/// Deny tokens are checked first, then a short-word heuristic that knocks
/// out error codes like "L2 TAG" or "EX PARITY ERR". Known customers pass
/// outright; anything else must be a reasonable length and either carry
/// lowercase letters or be long enough not to read as an abbreviation.
pub fn is_valid_customer_value(value: &str) -> bool {
    let value = value.trim();
    if value.chars().count() < 2 {
        return false;
    }

    let upper = value.to_uppercase();
    if NON_CUSTOMER_TOKENS.iter().any(|t| upper.contains(t)) {
        return false;
    }

    let words: Vec<&str> = value.split_whitespace().collect();
    if words.len() >= 2 {
        let short = words.iter().filter(|w| w.chars().count() <= 3).count();
        if short * 2 >= words.len() {
            return false;
        }
    }

    if KNOWN_CUSTOMERS.iter().any(|t| upper.contains(t)) {
        return true;
    }

    let len = value.chars().count();
    (3..=50).contains(&len) && (value != upper || len > 6)
}

/// Derive a customer name from a report filename.
///
/// All known customers found in the name are joined with a space (deck
/// names like "Turin-Dense_AlibabaTencent_FA_Status" carry several);
/// otherwise the leading word is used unless it is report vocabulary.
pub fn customer_from_filename(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let upper = filename.to_uppercase();
    let found: Vec<&str> = FILENAME_CUSTOMERS
        .iter()
        .copied()
        .filter(|c| upper.contains(c.to_uppercase().as_str()))
        .collect();
    if !found.is_empty() {
        return Some(found.join(" "));
    }

    let first = FIRST_WORD.captures(filename)?.get(1)?.as_str();
    if GENERIC_FIRST_WORDS.contains(&first.to_lowercase().as_str()) {
        return None;
    }
    Some(first.to_string())
}
