// src/merge/redistribute.rs
//
// Component-to-parent folding. Some rows track components (a CPU pulled
// from a system) whose "component/part" field names the system serial the
// part belongs to. Those records are not standalone assets: their data is
// folded into the parent under `_components` and the component identity
// is removed from the top-level set.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::merge::CanonicalAsset;

static COMPONENT_MARKERS: &[&str] = &["component", "part", "child"];

/// Identity-like run inside a relationship field value.
static IDENTITY_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_\-]{8,}").unwrap());

fn component_field(asset: &CanonicalAsset) -> Option<&str> {
    asset.fields.iter().find_map(|(key, value)| {
        if key.starts_with('_') {
            return None;
        }
        let lower = key.to_lowercase();
        if COMPONENT_MARKERS.iter().any(|m| lower.contains(m)) {
            value.as_str()
        } else {
            None
        }
    })
}

/// Fold every component asset into its parent(s). Returns the number of
/// component identities removed. Runs on the fully merged set, since a
/// relationship may name an identity first seen in a later sheet.
/// Applying it a second time changes nothing: folded data lives under a
/// metadata key the scan ignores, and folded identities are gone.
pub fn fold_components(assets: &mut Vec<CanonicalAsset>) -> usize {
    let existing: HashSet<String> = assets.iter().map(|a| a.identity.clone()).collect();

    let mut edges: Vec<(String, Vec<String>)> = Vec::new();
    for asset in assets.iter() {
        let Some(text) = component_field(asset) else {
            continue;
        };
        let parents: Vec<String> = IDENTITY_TOKEN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|token| *token != asset.identity && existing.contains(token))
            .collect();
        if !parents.is_empty() {
            edges.push((asset.identity.clone(), parents));
        }
    }

    let mut folded = 0;
    for (component, parents) in edges {
        let Some(pos) = assets.iter().position(|a| a.identity == component) else {
            continue;
        };
        let snapshot = assets[pos].fields.clone();
        debug!(component = %component, parents = parents.len(), "Folding component into parents");

        for parent in &parents {
            let Some(parent_asset) = assets.iter_mut().find(|a| a.identity == *parent) else {
                continue;
            };
            let entry = json!({
                "component_identity": &component,
                "fields": snapshot.clone(),
            });
            let list = parent_asset
                .fields
                .entry("_components".to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(list) = list.as_array_mut() {
                list.push(entry);
            }
        }

        assets.remove(pos);
        folded += 1;
    }
    folded
}
