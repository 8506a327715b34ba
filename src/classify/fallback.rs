// src/classify/fallback.rs
//
// Deterministic role classification from the column name alone. Used for
// every column the oracle cannot classify, and for whole files when the
// oracle is unconfigured or down. The chain is ordered: date markers run
// before tier markers so "Fail Date" is a date, not an "ate" tier; error
// markers re-route to DIAGNOSTIC when the name points at a file or log,
// and to DESCRIPTION when it names a physical location rather than a
// failure.

use crate::classify::ColumnRole;

static IDENTITY_MARKERS: &[&str] = &[
    "cpu_sn", "cpu sn", "cpusn", "2d_barcode", "serial", "sn", "barcode", "ppid", "system_sn",
    "rma#", "asset",
];

static DATE_MARKERS: &[&str] = &[
    "date",
    "time",
    "日期",
    "deploy",
    "fail_date",
    "datecode",
    "timestamp",
];

static TIER_MARKERS: &[&str] = &[
    "l1", "l2", "l3", "ate", "slt", "ceslt", "osv", "afhc", "ft1", "ft2", "fs1", "fs2", "tier",
];

static ERROR_MARKERS: &[&str] = &[
    "error", "fail", "symptom", "issue", "problem", "错误", "故障", "fault",
];

/// Inside an error-looking name these mean "pointer to a file", not an
/// error description.
static FILE_MARKERS: &[&str] = &["dump", "log", "file", "path", ".tar", ".gz", "afhc"];

/// Inside an error-looking name these mean "where it failed", which reads
/// as free-form commentary rather than a primary error type.
static LOCATION_MARKERS: &[&str] = &["core", "ccd", "socket", "die", "dimm", "channel", "rank"];

static STATUS_MARKERS: &[&str] = &[
    "status",
    "state",
    "状态",
    "fa_status",
    "fa status",
    "rma status",
    "resolution",
];

static CUSTOMER_MARKERS: &[&str] = &["customer", "client", "客户", "cust", "end_customer"];

static PLATFORM_MARKERS: &[&str] = &[
    "platform", "bios", "firmware", "version", "hardware", "config", "cpu", "dimm",
];

static DIAGNOSTIC_MARKERS: &[&str] = &[
    "dump",
    "log",
    "file",
    "path",
    "url",
    "link",
    "sharepoint",
    "http",
    ".tar",
    ".gz",
    "afhc",
    "diagnostic",
];

static DESCRIPTION_MARKERS: &[&str] = &[
    "comment",
    "note",
    "description",
    "summary",
    "observation",
    "debug",
    "remark",
];

/// Assign a role to one column name. Total: every name gets exactly one
/// role, unknown names get `Ignore`.
pub fn fallback_role(column_name: &str) -> ColumnRole {
    let col = column_name.trim().to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| col.contains(m));

    if has(IDENTITY_MARKERS) {
        return ColumnRole::Identity;
    }
    if has(DATE_MARKERS) {
        return ColumnRole::Date;
    }
    if has(TIER_MARKERS) {
        return ColumnRole::TestTier;
    }
    if has(ERROR_MARKERS) {
        if has(FILE_MARKERS) {
            return ColumnRole::Diagnostic;
        }
        if has(LOCATION_MARKERS) {
            return ColumnRole::Description;
        }
        return ColumnRole::ErrorType;
    }
    if has(STATUS_MARKERS) {
        return ColumnRole::Status;
    }
    if has(CUSTOMER_MARKERS) {
        return ColumnRole::Customer;
    }
    if has(PLATFORM_MARKERS) {
        return ColumnRole::Platform;
    }
    if has(DIAGNOSTIC_MARKERS) {
        return ColumnRole::Diagnostic;
    }
    if has(DESCRIPTION_MARKERS) {
        return ColumnRole::Description;
    }
    ColumnRole::Ignore
}
