// src/merge/mod.rs
//
// Cross-source merge. One IdentityIndex lives for one ingestion run and
// folds every DraftRecord into its CanonicalAsset keyed by identity.
// First sighting creates the asset; later sightings from other sheets or
// files append provenance and merge fields, with errorType and status
// set once and then sticky for the rest of the run.

pub mod cleanup;
pub mod redistribute;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::classify::{Classification, ColumnRole, RoleMap};
use crate::record::{is_valid_customer_value, DraftRecord, RowField, RowOrigin};
use crate::source::normalize_name;

pub use cleanup::clean_error_text;
pub use redistribute::fold_components;

/// One reconciled device, as handed to persistence and serialized for
/// the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalAsset {
    pub identity: String,
    pub error_type: Option<String>,
    pub status: Option<String>,
    /// Filename of the most recent contributing source.
    pub source_filename: String,
    pub created_at: DateTime<Utc>,
    pub fields: BTreeMap<String, Value>,
}

/// Working state of one asset while the run accumulates sightings.
#[derive(Debug, Clone)]
struct AssetState {
    identity: String,
    error_type: Option<String>,
    status: Option<String>,
    source_filename: String,
    created_at: DateTime<Utc>,
    first: RowOrigin,
    identity_column: String,
    customer_hint: Option<String>,
    sheets_found: Vec<String>,
    /// Every sighting location, materialized on the first duplicate.
    sightings_all: Option<Vec<(String, usize)>>,
    fields: Vec<RowField>,
    error_sources: Vec<String>,
    diagnostics: Vec<(String, String)>,
}

/// Carried past redistribution and attached to surviving assets only.
struct AssetExtras {
    error_sources: Vec<String>,
    diagnostics: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct IdentityIndex {
    assets: Vec<AssetState>,
    by_identity: HashMap<String, usize>,
    /// Column→role union across every file the run ingested.
    column_roles: RoleMap,
    pub rejected_customers: usize,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Record one file's column→role map for the final audit trail.
    /// Later files overwrite shared names.
    pub fn record_classification(&mut self, classification: &Classification) {
        for (column, role) in &classification.roles {
            self.column_roles.insert(column.clone(), *role);
        }
    }

    /// Fold one row's draft into its asset.
    pub fn upsert(&mut self, draft: DraftRecord) {
        let sighting = format!("{} (row {})", draft.origin.sheet, draft.origin.row);
        let idx = match self.by_identity.get(draft.identity.as_str()) {
            Some(&idx) => {
                let state = &mut self.assets[idx];
                state.sheets_found.push(sighting);
                if state.sightings_all.is_none() {
                    state.sightings_all =
                        Some(vec![(state.first.sheet.clone(), state.first.row)]);
                }
                if let Some(all) = state.sightings_all.as_mut() {
                    all.push((draft.origin.sheet.clone(), draft.origin.row));
                }
                state.source_filename = draft.origin.file.clone();
                idx
            }
            None => {
                self.assets.push(AssetState {
                    identity: draft.identity.clone(),
                    error_type: None,
                    status: None,
                    source_filename: draft.origin.file.clone(),
                    created_at: Utc::now(),
                    first: draft.origin.clone(),
                    identity_column: draft.identity_column.clone(),
                    customer_hint: draft.customer_hint.clone(),
                    sheets_found: vec![sighting],
                    sightings_all: None,
                    fields: Vec::new(),
                    error_sources: Vec::new(),
                    diagnostics: Vec::new(),
                });
                let idx = self.assets.len() - 1;
                self.by_identity.insert(draft.identity.clone(), idx);
                idx
            }
        };

        let state = &mut self.assets[idx];

        for candidate in &draft.error_candidates {
            state.error_sources.push(candidate.source.clone());
        }
        if state.error_type.is_none() {
            if let Some(first) = draft.error_candidates.first() {
                state.error_type = Some(first.text.clone());
            } else if let Some(tier_col) = &draft.tier_failure {
                state.error_type = Some(format!("Failed at: {tier_col}"));
                state.error_sources.push(format!("tier:{tier_col}"));
            }
        }

        if state.status.is_none() {
            if let Some(value) = &draft.explicit_status {
                state.status = Some(value.clone());
            } else if let Some(inferred) = draft.inferred_status {
                state.status = Some(inferred.to_string());
            }
        }

        for (column, value) in &draft.diagnostics {
            match state.diagnostics.iter_mut().find(|(c, _)| c == column) {
                Some((_, existing)) => *existing = value.clone(),
                None => state.diagnostics.push((column.clone(), value.clone())),
            }
        }

        for field in &draft.fields {
            let normalized = normalize_name(&field.column);
            match state
                .fields
                .iter_mut()
                .find(|f| normalize_name(&f.column) == normalized)
            {
                Some(existing) => {
                    if existing.value != field.value {
                        existing.value = format!("{} | {}", existing.value, field.value);
                    }
                }
                None => {
                    if field.role == ColumnRole::Customer
                        && !is_valid_customer_value(&field.value)
                    {
                        debug!(column = %field.column, value = %field.value,
                            "Rejected non-customer value in customer column");
                        self.rejected_customers += 1;
                        continue;
                    }
                    state.fields.push(field.clone());
                }
            }
        }
    }

    /// Close the run: materialize field maps, fold components into
    /// parents, clean primary error types, and attach audit metadata.
    pub fn finalize(self) -> Vec<CanonicalAsset> {
        let roles_wire: BTreeMap<&str, &str> = self
            .column_roles
            .iter()
            .map(|(column, role)| (column.as_str(), role.as_str()))
            .collect();
        let column_roles = json!(roles_wire);

        let mut extras: HashMap<String, AssetExtras> = HashMap::new();
        let mut assets: Vec<CanonicalAsset> = Vec::with_capacity(self.assets.len());
        for state in self.assets {
            let (asset, extra) = state.into_preliminary();
            extras.insert(asset.identity.clone(), extra);
            assets.push(asset);
        }

        let folded = redistribute::fold_components(&mut assets);
        if folded > 0 {
            info!(folded, remaining = assets.len(), "Folded component identities into parents");
        }

        for asset in &mut assets {
            asset
                .fields
                .insert("_column_roles".to_string(), column_roles.clone());

            let Some(extra) = extras.remove(&asset.identity) else {
                continue;
            };

            if let Some(error) = asset.error_type.take() {
                let cleaned = cleanup::clean_error_text(&error);
                if cleaned != error {
                    asset
                        .fields
                        .insert("_original_error_type".to_string(), Value::String(error));
                }
                asset.error_type = Some(cleaned);
            }

            if !extra.error_sources.is_empty() {
                asset
                    .fields
                    .insert("_error_sources".to_string(), json!(extra.error_sources));
            }
            if !extra.diagnostics.is_empty() {
                let diagnostics: BTreeMap<&str, &str> = extra
                    .diagnostics
                    .iter()
                    .map(|(c, v)| (c.as_str(), v.as_str()))
                    .collect();
                asset
                    .fields
                    .insert("_diagnostics".to_string(), json!(diagnostics));
            }
        }

        assets
    }
}

impl AssetState {
    /// Build the pre-redistribution asset: provenance metadata, merged
    /// data fields, customer backfill, and the contributing-sheet summary.
    fn into_preliminary(self) -> (CanonicalAsset, AssetExtras) {
        let mut fields: BTreeMap<String, Value> = BTreeMap::new();
        fields.insert(
            "_source_filename".to_string(),
            Value::String(self.first.file.clone()),
        );
        fields.insert(
            "_source_sheet".to_string(),
            Value::String(self.first.sheet.clone()),
        );
        fields.insert("_source_row".to_string(), json!(self.first.row));
        fields.insert(
            "_identity_column".to_string(),
            Value::String(self.identity_column),
        );
        if let Some(all) = self.sightings_all {
            let sightings: Vec<Value> = all
                .into_iter()
                .map(|(sheet, row)| json!({ "sheet": sheet, "row": row }))
                .collect();
            fields.insert("_source_sheets_all".to_string(), Value::Array(sightings));
        }

        for field in self.fields {
            fields.insert(field.column, Value::String(field.value));
        }

        if let Some(hint) = self.customer_hint {
            let has_customer_column = fields
                .keys()
                .filter(|k| !k.starts_with('_'))
                .any(|k| normalize_name(k).contains("customer"));
            if !has_customer_column {
                fields.insert("Customer".to_string(), Value::String(hint));
            }
        }

        fields.insert(
            "_sheets_combined".to_string(),
            Value::String(self.sheets_found.join(", ")),
        );
        fields.insert("_total_sheets".to_string(), json!(self.sheets_found.len()));

        let asset = CanonicalAsset {
            identity: self.identity,
            error_type: self.error_type,
            status: self.status,
            source_filename: self.source_filename,
            created_at: self.created_at,
            fields,
        };
        let extras = AssetExtras {
            error_sources: self.error_sources,
            diagnostics: self.diagnostics,
        };
        (asset, extras)
    }
}
