// src/classify/mod.rs
//
// Column-role assignment. The oracle gets the first shot at every file;
// whatever it cannot or does not answer falls through to the local rule
// chain, column by column.

pub mod fallback;
pub mod oracle;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use fallback::fallback_role;
pub use oracle::{ClassifyRequest, ClassifyResponse, HttpOracle, OracleError, RoleOracle};

/// Semantic role of one column. Wire form is the SCREAMING_SNAKE name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnRole {
    Identity,
    ErrorType,
    Status,
    TestTier,
    Date,
    Customer,
    Platform,
    Diagnostic,
    Description,
    Ignore,
}

impl ColumnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnRole::Identity => "IDENTITY",
            ColumnRole::ErrorType => "ERROR_TYPE",
            ColumnRole::Status => "STATUS",
            ColumnRole::TestTier => "TEST_TIER",
            ColumnRole::Date => "DATE",
            ColumnRole::Customer => "CUSTOMER",
            ColumnRole::Platform => "PLATFORM",
            ColumnRole::Diagnostic => "DIAGNOSTIC",
            ColumnRole::Description => "DESCRIPTION",
            ColumnRole::Ignore => "IGNORE",
        }
    }

    /// Parse a wire-form role name, tolerating case. Anything outside the
    /// closed enum is `None`, which callers treat as "use the fallback".
    pub fn parse_wire(value: &str) -> Option<ColumnRole> {
        match value.trim().to_uppercase().as_str() {
            "IDENTITY" => Some(ColumnRole::Identity),
            "ERROR_TYPE" => Some(ColumnRole::ErrorType),
            "STATUS" => Some(ColumnRole::Status),
            "TEST_TIER" => Some(ColumnRole::TestTier),
            "DATE" => Some(ColumnRole::Date),
            "CUSTOMER" => Some(ColumnRole::Customer),
            "PLATFORM" => Some(ColumnRole::Platform),
            "DIAGNOSTIC" => Some(ColumnRole::Diagnostic),
            "DESCRIPTION" => Some(ColumnRole::Description),
            "IGNORE" => Some(ColumnRole::Ignore),
            _ => None,
        }
    }
}

pub type RoleMap = BTreeMap<String, ColumnRole>;

/// Validated role assignment for one file.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub roles: RoleMap,
    /// Column the oracle named as the identity column, if any.
    pub identity_column: Option<String>,
    /// Column the oracle flagged as holding identity plus error text.
    pub error_extraction_column: Option<String>,
    pub oracle_used: bool,
}

impl Classification {
    pub fn role_of(&self, column: &str) -> ColumnRole {
        self.roles
            .get(column)
            .copied()
            .unwrap_or(ColumnRole::Ignore)
    }
}

/// Validate an oracle response against the closed enum, substituting the
/// fallback rule for every missing or invalid entry. `None` means the
/// oracle was skipped or failed and the whole file is fallback-classified.
pub fn resolve_roles(columns: &[String], response: Option<ClassifyResponse>) -> Classification {
    let Some(response) = response else {
        let roles = columns
            .iter()
            .map(|col| (col.clone(), fallback_role(col)))
            .collect();
        return Classification {
            roles,
            ..Classification::default()
        };
    };

    let mut roles = RoleMap::new();
    let mut substituted = 0usize;
    for col in columns {
        let role = response
            .classifications
            .get(col)
            .and_then(|raw| ColumnRole::parse_wire(raw));
        let role = match role {
            Some(role) => role,
            None => {
                substituted += 1;
                fallback_role(col)
            }
        };
        roles.insert(col.clone(), role);
    }
    if substituted > 0 {
        debug!(substituted, "Fallback roles substituted for oracle gaps");
    }

    Classification {
        roles,
        identity_column: response.identity_column,
        error_extraction_column: response.error_extraction_column,
        oracle_used: true,
    }
}

/// Classify one file's columns: ask the oracle if there is one, then
/// validate or fall back. Oracle failure is logged and recovered, never
/// propagated.
pub async fn classify_columns<O: RoleOracle>(
    oracle: Option<&O>,
    columns: &[String],
    sample_rows: Vec<BTreeMap<String, String>>,
) -> Classification {
    if columns.is_empty() {
        return Classification::default();
    }

    let response = match oracle {
        Some(oracle) => {
            let request = ClassifyRequest {
                column_names: columns.to_vec(),
                sample_rows,
            };
            match oracle.classify(&request).await {
                Ok(response) => Some(response),
                Err(err) => {
                    warn!(error = %err, "Role oracle failed, classifying locally");
                    None
                }
            }
        }
        None => None,
    };

    resolve_roles(columns, response)
}
