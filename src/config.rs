// src/config.rs
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Connection settings for the remote column-classification service.
///
/// `endpoint = None` disables the remote call entirely and every file is
/// classified by the local fallback rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub endpoint: Option<String>,
    pub auth_token: Option<String>,
    /// Per-request ceiling for one classification round trip.
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            endpoint: None,
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tunable knobs for one ingestion run. Every field has a working default;
/// a YAML file can override any subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Sheets whose lowercased name contains one of these are treated as
    /// lookup/reference data, not failure reports. Only applied when the
    /// workbook has more than one sheet.
    pub skip_sheet_patterns: Vec<String>,
    /// Sheets with more data rows than this are skipped (same multi-sheet
    /// condition as the name patterns).
    pub max_sheet_rows: usize,
    /// How many non-empty values the identity detector samples per column.
    pub sample_value_limit: usize,
    /// How many representative rows are sent to the classification service.
    pub sample_row_limit: usize,
    /// How many leading data rows per sheet are scanned for those samples.
    pub peek_row_limit: usize,
    /// Sample cell values are truncated to this many chars before sending.
    pub sample_cell_chars: usize,
    /// Error-type values longer than this are rejected as descriptions.
    pub max_error_len: usize,
    pub oracle: OracleConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            skip_sheet_patterns: [
                "datecode", "lookup", "reference", "master", "database", "template",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_sheet_rows: 2000,
            sample_value_limit: 100,
            sample_row_limit: 5,
            peek_row_limit: 50,
            sample_cell_chars: 200,
            max_error_len: 100,
            oracle: OracleConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Read a YAML config file. Missing keys keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let cfg: IngestConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(cfg)
    }

    /// True when `sheet_name` matches one of the skip patterns.
    pub fn is_skippable_sheet_name(&self, sheet_name: &str) -> bool {
        let lower = sheet_name.trim().to_lowercase();
        self.skip_sheet_patterns.iter().any(|p| lower.contains(p))
    }
}
