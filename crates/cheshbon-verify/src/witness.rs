//! Witness computation for all-details reports.
//!
//! A witness is the structured evidence behind one impact claim: the
//! reasons, the dependency path, and the IDs of the change events that
//! caused it. Every field is re-derivable from the input artifacts, which is
//! what makes independent verification possible.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use cheshbon_core::canonical::{canonical_json, sha256_hex};
use cheshbon_core::error::CanonicalizationError;
use cheshbon_core::spec::MappingSpec;
use cheshbon_diff::{ChangeEvent, DiffResult, ReasonCode};

/// Evidence for a single impacted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Witness {
    /// The impacted node.
    pub id: String,
    /// Highest-precedence reason.
    pub primary_reason: ReasonCode,
    /// All reasons, primary first.
    pub all_reasons: Vec<ReasonCode>,
    /// Dependency path from the nearest seed.
    pub path: Vec<String>,
    /// Alternative dependency paths within the bound.
    pub alt_path_count: usize,
    /// IDs of the change events behind the primary reason. Empty for
    /// binding-caused impact, which has no change event.
    pub source_events: Vec<String>,
}

/// Stable ID of a change event: `evt:` + the first 8 hex chars of its
/// canonical digest.
pub fn event_id(event: &ChangeEvent) -> Result<String, CanonicalizationError> {
    let value = serde_json::to_value(event).map_err(|e| CanonicalizationError::NonJsonType {
        detail: e.to_string(),
    })?;
    let canonical = canonical_json(&value)?;
    let digest = sha256_hex(canonical.as_bytes());
    Ok(format!("evt:{}", &digest[..8]))
}

/// Compute witnesses for every impacted node, sorted by node ID.
pub fn compute_witnesses(
    result: &DiffResult,
    from_spec: &MappingSpec,
    to_spec: &MappingSpec,
) -> Result<Vec<Witness>, CanonicalizationError> {
    let mut events_by_element: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for event in &result.events {
        events_by_element
            .entry(event.element_id.as_str())
            .or_default()
            .insert(event_id(event)?);
    }
    let events_for = |element: &str| -> BTreeSet<String> {
        events_by_element.get(element).cloned().unwrap_or_default()
    };

    let mut witnesses = Vec::with_capacity(result.impacted_ids.len());
    for node in &result.impacted_ids {
        let reasons = result
            .reasons
            .get(node)
            .cloned()
            .unwrap_or_else(|| vec![ReasonCode::TransitiveDependency]);
        let primary = reasons[0];
        let path = result
            .paths
            .get(node)
            .cloned()
            .unwrap_or_else(|| vec![node.clone()]);
        let alt_path_count = result.alt_path_counts.get(node).copied().unwrap_or(0);

        let source_events: BTreeSet<String> = match primary {
            ReasonCode::DirectChange | ReasonCode::DirectChangeMissingInput => events_for(node),
            ReasonCode::MissingInput => result
                .missing_inputs
                .get(node)
                .into_iter()
                .flatten()
                .flat_map(|input| events_for(input))
                .collect(),
            ReasonCode::TransformImplChanged | ReasonCode::MissingTransformRef => {
                let transform_ref = to_spec
                    .derived_by_id(node)
                    .or_else(|| from_spec.derived_by_id(node))
                    .and_then(|d| d.transform_ref.clone());
                transform_ref
                    .map(|t| events_for(&t))
                    .unwrap_or_default()
            }
            ReasonCode::TransitiveDependency | ReasonCode::Cycle => {
                events_for(path.first().map(String::as_str).unwrap_or(node))
            }
            ReasonCode::MissingBinding | ReasonCode::AmbiguousBinding => BTreeSet::new(),
        };

        witnesses.push(Witness {
            id: node.clone(),
            primary_reason: primary,
            all_reasons: reasons,
            path,
            alt_path_count,
            source_events: source_events.into_iter().collect(),
        });
    }

    Ok(witnesses)
}
