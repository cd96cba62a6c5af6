//! Binding layer: raw upstream column names mapped to stable source IDs.
//!
//! Binding problems are data, not exceptions: the impact engine consumes the
//! statuses computed here and decides what they invalidate. Precedence is
//! `AmbiguousBinding > MissingBinding > Bound`, and ambiguity is terminal.
//!
//! Raw column *type* drift under a still-present binding is deliberately not
//! detected; there are no type-compatibility rules in this layer.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::spec::MappingSpec;

/// A raw column in an extract schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    /// Upstream column name.
    pub name: String,
    /// Declared type, opaque to the kernel.
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Raw schema snapshot from an extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSchema {
    /// Source table name.
    pub table: String,
    /// Columns present in the extract.
    pub columns: Vec<RawColumn>,
}

impl RawSchema {
    /// Names of all columns in the schema.
    pub fn column_names(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Bindings from raw column names to stable source IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bindings {
    /// Source table name.
    pub table: String,
    /// Map raw column name -> `s:`-prefixed source ID.
    pub bindings: BTreeMap<String, String>,
}

impl Bindings {
    /// Source IDs that have at least one binding.
    pub fn bound_source_ids(&self) -> BTreeSet<String> {
        self.bindings.values().cloned().collect()
    }
}

/// Binding status of a required source ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindingStatus {
    /// Exactly one raw column maps to the source ID.
    Bound,
    /// No raw column maps to the source ID.
    MissingBinding,
    /// More than one raw column maps to the source ID. Terminal.
    AmbiguousBinding,
}

/// A binding validity finding against a raw schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingIssue {
    /// The bound source ID.
    pub source_id: String,
    /// The raw column the binding names.
    pub raw_column: String,
    /// Human-readable description.
    pub detail: String,
}

/// Source IDs required by any derived variable or constraint.
pub fn required_source_ids(spec: &MappingSpec) -> BTreeSet<String> {
    let mut required = BTreeSet::new();
    for derived in &spec.derived {
        required.extend(
            derived
                .inputs
                .iter()
                .filter(|i| i.starts_with("s:"))
                .cloned(),
        );
    }
    for constraint in &spec.constraints {
        required.extend(
            constraint
                .inputs
                .iter()
                .filter(|i| i.starts_with("s:"))
                .cloned(),
        );
    }
    required
}

/// Binding status per required source ID.
///
/// `AmbiguousBinding` beats `MissingBinding` beats `Bound`.
pub fn binding_status(spec: &MappingSpec, bindings: &Bindings) -> BTreeMap<String, BindingStatus> {
    let ambiguous = ambiguous_bindings(bindings);
    let bound = bindings.bound_source_ids();

    required_source_ids(spec)
        .into_iter()
        .map(|source_id| {
            let status = if ambiguous.contains_key(&source_id) {
                BindingStatus::AmbiguousBinding
            } else if bound.contains(&source_id) {
                BindingStatus::Bound
            } else {
                BindingStatus::MissingBinding
            };
            (source_id, status)
        })
        .collect()
}

/// Source IDs bound by more than one raw column, with the raw columns sorted.
pub fn ambiguous_bindings(bindings: &Bindings) -> BTreeMap<String, Vec<String>> {
    let mut by_source: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (raw_column, source_id) in &bindings.bindings {
        by_source
            .entry(source_id.clone())
            .or_default()
            .insert(raw_column.clone());
    }
    by_source
        .into_iter()
        .filter(|(_, columns)| columns.len() > 1)
        .map(|(source_id, columns)| (source_id, columns.into_iter().collect()))
        .collect()
}

/// Required source IDs with no binding at all.
pub fn missing_source_bindings(spec: &MappingSpec, bindings: &Bindings) -> BTreeSet<String> {
    let bound = bindings.bound_source_ids();
    required_source_ids(spec)
        .into_iter()
        .filter(|s| !bound.contains(s))
        .collect()
}

/// Bindings whose raw column does not appear in the schema.
///
/// Returns the findings plus the schema columns left unmapped
/// (informational).
pub fn invalid_bindings(
    schema: &RawSchema,
    bindings: &Bindings,
) -> (Vec<BindingIssue>, BTreeSet<String>) {
    let schema_columns = schema.column_names();

    let issues = bindings
        .bindings
        .iter()
        .filter(|(raw_column, _)| !schema_columns.contains(*raw_column))
        .map(|(raw_column, source_id)| BindingIssue {
            source_id: source_id.clone(),
            raw_column: raw_column.clone(),
            detail: format!("raw column '{raw_column}' not found in schema"),
        })
        .collect();

    let bound_columns: BTreeSet<String> = bindings.bindings.keys().cloned().collect();
    let unmapped = schema_columns
        .difference(&bound_columns)
        .cloned()
        .collect();

    (issues, unmapped)
}
