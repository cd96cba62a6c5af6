//! Typed mapping-spec model with load-time validation.
//!
//! A [`MappingSpec`] is an immutable value object. Parsing canonicalizes
//! input lists (sorted, duplicate-free) and computes `params_hash` for every
//! derived variable, so downstream set comparisons are plain equality.
//! Identity lives in the typed-prefix IDs (`s:`, `d:`, `c:`); display names
//! are metadata and never carry meaning.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{canonical_len, hash_params};
use crate::error::SpecValidationError;

/// Hard limit on the canonical size of transform params, in bytes.
pub const PARAMS_HARD_LIMIT: usize = 50_000;

/// Advisory threshold above which params are flagged as large.
pub const PARAMS_WARN_LIMIT: usize = 10_000;

/// A source column declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    /// Stable identifier, e.g. `s:BRTHDT`.
    pub id: String,
    /// Display name (metadata only; renames never cause impact).
    pub name: String,
    /// Declared type, opaque to the kernel.
    #[serde(rename = "type")]
    pub column_type: String,
}

/// A derived variable: output defined by a transform over inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedVariable {
    /// Stable identifier, e.g. `d:AGE`.
    pub id: String,
    /// Display name (metadata only).
    pub name: String,
    /// Declared type, opaque to the kernel.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Input references; canonicalized to a sorted, duplicate-free list.
    pub inputs: Vec<String>,
    /// Reference into the transform registry, `t:`-prefixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_ref: Option<String>,
    /// Transform-specific parameters as pure canonical JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Canonical digest of `params`, computed at load. Never serialized.
    #[serde(skip)]
    params_hash: String,
}

impl DerivedVariable {
    /// Canonical digest of this variable's params.
    pub fn params_hash(&self) -> &str {
        &self.params_hash
    }
}

/// A constraint node: a derived node with boolean output.
///
/// Constraints live in the same graph, the same diff, and the same impact
/// logic as derived variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Stable identifier, e.g. `c:AGE_GE_0`.
    pub id: String,
    /// Display name (metadata only).
    pub name: String,
    /// Input references; canonicalized to a sorted, duplicate-free list.
    pub inputs: Vec<String>,
    /// Constraint expression, opaque to the kernel. Never executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// A versioned mapping specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSpec {
    /// Artifact schema version tag.
    pub schema_version: String,
    /// Source column declarations.
    pub sources: Vec<SourceColumn>,
    /// Derived variable declarations.
    pub derived: Vec<DerivedVariable>,
    /// Constraint declarations.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl MappingSpec {
    /// Parse and validate a spec from a JSON value.
    ///
    /// Validation enforces ID prefixes, uniqueness across all kinds,
    /// duplicate-free inputs, and params purity and size. Inputs are
    /// canonicalized to sorted lists and `params_hash` is computed here.
    /// Unresolved input references are not an error at this layer; they are
    /// flagged on the dependency graph.
    pub fn from_value(value: &Value) -> Result<Self, SpecValidationError> {
        let mut spec: MappingSpec = serde_json::from_value(value.clone())
            .map_err(|e| SpecValidationError::InvalidStructure(e.to_string()))?;
        spec.validate_and_canonicalize()?;
        Ok(spec)
    }

    fn validate_and_canonicalize(&mut self) -> Result<(), SpecValidationError> {
        for source in &self.sources {
            validate_element_id(&source.id, "s:")?;
        }
        for derived in &self.derived {
            validate_element_id(&derived.id, "d:")?;
        }
        for constraint in &self.constraints {
            validate_element_id(&constraint.id, "c:")?;
        }

        let mut seen = std::collections::BTreeSet::new();
        for id in self
            .sources
            .iter()
            .map(|s| &s.id)
            .chain(self.derived.iter().map(|d| &d.id))
            .chain(self.constraints.iter().map(|c| &c.id))
        {
            if !seen.insert(id.clone()) {
                return Err(SpecValidationError::DuplicateId(id.clone()));
            }
        }

        for derived in &mut self.derived {
            if let Some(transform_ref) = &derived.transform_ref {
                if !transform_ref.starts_with("t:") || transform_ref.len() <= 2 {
                    return Err(SpecValidationError::InvalidIdFormat {
                        id: transform_ref.clone(),
                        detail: format!(
                            "transform reference on '{}' must start with 't:'",
                            derived.id
                        ),
                    });
                }
            }
            derived.inputs = canonicalize_inputs(&derived.id, &derived.inputs)?;

            if let Some(params) = &derived.params {
                let len = canonical_len(params).map_err(|source| {
                    SpecValidationError::ParamsNotCanonical {
                        id: derived.id.clone(),
                        source,
                    }
                })?;
                if len > PARAMS_HARD_LIMIT {
                    return Err(SpecValidationError::ParamsTooLarge {
                        id: derived.id.clone(),
                        limit: PARAMS_HARD_LIMIT,
                        actual: len,
                    });
                }
            }
            derived.params_hash = hash_params(derived.params.as_ref()).map_err(|source| {
                SpecValidationError::ParamsNotCanonical {
                    id: derived.id.clone(),
                    source,
                }
            })?;
        }

        for constraint in &mut self.constraints {
            constraint.inputs = canonicalize_inputs(&constraint.id, &constraint.inputs)?;
        }

        Ok(())
    }

    /// IDs of all source columns.
    pub fn source_ids(&self) -> std::collections::BTreeSet<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }

    /// IDs of all derived variables.
    pub fn derived_ids(&self) -> std::collections::BTreeSet<String> {
        self.derived.iter().map(|d| d.id.clone()).collect()
    }

    /// IDs of all constraints.
    pub fn constraint_ids(&self) -> std::collections::BTreeSet<String> {
        self.constraints.iter().map(|c| c.id.clone()).collect()
    }

    /// IDs of every declared element.
    pub fn all_ids(&self) -> std::collections::BTreeSet<String> {
        let mut ids = self.source_ids();
        ids.extend(self.derived_ids());
        ids.extend(self.constraint_ids());
        ids
    }

    /// Look up a derived variable by ID.
    pub fn derived_by_id(&self, id: &str) -> Option<&DerivedVariable> {
        self.derived.iter().find(|d| d.id == id)
    }

    /// Look up a constraint by ID.
    pub fn constraint_by_id(&self, id: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }

    /// Derived variables whose canonical params exceed the advisory limit.
    ///
    /// Returns `(derived_id, canonical_bytes)` pairs, sorted by ID. Params
    /// were already validated canonical at load.
    pub fn oversized_params(&self) -> Vec<(String, usize)> {
        let mut large: Vec<(String, usize)> = self
            .derived
            .iter()
            .filter_map(|d| {
                let params = d.params.as_ref()?;
                let len = canonical_len(params).ok()?;
                (len > PARAMS_WARN_LIMIT).then(|| (d.id.clone(), len))
            })
            .collect();
        large.sort();
        large
    }
}

/// Prefixes an input reference may carry.
const INPUT_PREFIXES: [&str; 3] = ["s:", "d:", "c:"];

fn validate_element_id(id: &str, prefix: &str) -> Result<(), SpecValidationError> {
    if !id.starts_with(prefix) || id.len() <= prefix.len() {
        return Err(SpecValidationError::InvalidIdFormat {
            id: id.to_string(),
            detail: format!("expected '{prefix}' prefix followed by a name"),
        });
    }
    Ok(())
}

fn canonicalize_inputs(
    element_id: &str,
    inputs: &[String],
) -> Result<Vec<String>, SpecValidationError> {
    let mut seen = std::collections::BTreeSet::new();
    for input in inputs {
        if !INPUT_PREFIXES.iter().any(|p| input.starts_with(p)) || input.len() <= 2 {
            return Err(SpecValidationError::InvalidIdFormat {
                id: input.clone(),
                detail: format!("input of '{element_id}' must start with 's:', 'd:', or 'c:'"),
            });
        }
        if !seen.insert(input.clone()) {
            return Err(SpecValidationError::InvalidIdFormat {
                id: input.clone(),
                detail: format!("duplicate input of '{element_id}'"),
            });
        }
    }
    Ok(seen.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_spec() -> Value {
        json!({
            "schema_version": "0.7",
            "sources": [
                {"id": "s:BRTHDT", "name": "BRTHDT", "type": "date"}
            ],
            "derived": [
                {
                    "id": "d:AGE",
                    "name": "AGE",
                    "type": "int",
                    "inputs": ["s:BRTHDT"],
                    "transform_ref": "t:age_from_date",
                    "params": {"unit": "years"}
                }
            ],
            "constraints": [
                {"id": "c:AGE_GE_0", "name": "AGE >= 0", "inputs": ["d:AGE"], "expression": "AGE >= 0"}
            ]
        })
    }

    #[test]
    fn parses_and_computes_params_hash() {
        let spec = MappingSpec::from_value(&minimal_spec()).unwrap();
        let d = spec.derived_by_id("d:AGE").unwrap();
        assert!(d.params_hash().starts_with("sha256:"));
    }

    #[test]
    fn params_hash_ignores_key_order() {
        let mut v1 = minimal_spec();
        v1["derived"][0]["params"] = json!({"a": 1, "b": 2});
        let mut v2 = minimal_spec();
        v2["derived"][0]["params"] = json!({"b": 2, "a": 1});
        let s1 = MappingSpec::from_value(&v1).unwrap();
        let s2 = MappingSpec::from_value(&v2).unwrap();
        assert_eq!(
            s1.derived_by_id("d:AGE").unwrap().params_hash(),
            s2.derived_by_id("d:AGE").unwrap().params_hash()
        );
    }

    #[test]
    fn inputs_canonicalized_sorted() {
        let mut value = minimal_spec();
        value["sources"] = json!([
            {"id": "s:A", "name": "A", "type": "string"},
            {"id": "s:B", "name": "B", "type": "string"}
        ]);
        value["derived"][0]["inputs"] = json!(["s:B", "s:A"]);
        let spec = MappingSpec::from_value(&value).unwrap();
        assert_eq!(spec.derived[0].inputs, vec!["s:A", "s:B"]);
    }

    #[test]
    fn duplicate_inputs_rejected() {
        let mut value = minimal_spec();
        value["derived"][0]["inputs"] = json!(["s:BRTHDT", "s:BRTHDT"]);
        let err = MappingSpec::from_value(&value).unwrap_err();
        assert!(matches!(err, SpecValidationError::InvalidIdFormat { .. }));
    }

    #[test]
    fn duplicate_ids_rejected_across_kinds() {
        let mut value = minimal_spec();
        value["sources"] = json!([
            {"id": "s:X", "name": "X", "type": "string"},
            {"id": "s:X", "name": "X2", "type": "string"}
        ]);
        value["derived"][0]["inputs"] = json!(["s:X"]);
        let err = MappingSpec::from_value(&value).unwrap_err();
        assert_eq!(err, SpecValidationError::DuplicateId("s:X".into()));
    }

    #[test]
    fn bad_id_prefix_rejected() {
        let mut value = minimal_spec();
        value["sources"][0]["id"] = json!("src:BRTHDT");
        let err = MappingSpec::from_value(&value).unwrap_err();
        assert!(matches!(err, SpecValidationError::InvalidIdFormat { .. }));
    }

    #[test]
    fn bad_transform_ref_rejected() {
        let mut value = minimal_spec();
        value["derived"][0]["transform_ref"] = json!("age_from_date");
        let err = MappingSpec::from_value(&value).unwrap_err();
        assert!(matches!(err, SpecValidationError::InvalidIdFormat { .. }));
    }

    #[test]
    fn float_params_rejected() {
        let mut value = minimal_spec();
        value["derived"][0]["params"] = json!({"rate": 1.5});
        let err = MappingSpec::from_value(&value).unwrap_err();
        assert!(matches!(err, SpecValidationError::ParamsNotCanonical { .. }));
    }

    #[test]
    fn oversized_params_rejected() {
        let mut value = minimal_spec();
        let big: String = "x".repeat(PARAMS_HARD_LIMIT + 1);
        value["derived"][0]["params"] = json!({ "blob": big });
        let err = MappingSpec::from_value(&value).unwrap_err();
        assert!(matches!(err, SpecValidationError::ParamsTooLarge { .. }));
    }

    #[test]
    fn large_params_flagged_not_rejected() {
        let mut value = minimal_spec();
        let big: String = "x".repeat(PARAMS_WARN_LIMIT + 100);
        value["derived"][0]["params"] = json!({ "blob": big });
        let spec = MappingSpec::from_value(&value).unwrap();
        let flagged = spec.oversized_params();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0, "d:AGE");
    }

    #[test]
    fn params_hash_not_serialized() {
        let spec = MappingSpec::from_value(&minimal_spec()).unwrap();
        let round = serde_json::to_value(&spec).unwrap();
        assert!(round["derived"][0].get("params_hash").is_none());
    }

    #[test]
    fn transform_ref_is_optional() {
        let mut value = minimal_spec();
        value["derived"][0].as_object_mut().unwrap().remove("transform_ref");
        let spec = MappingSpec::from_value(&value).unwrap();
        assert!(spec.derived[0].transform_ref.is_none());
    }
}
