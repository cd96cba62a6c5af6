//! Public API: `diff` and `validate` over in-memory artifacts.
//!
//! The kernel consumes parsed models and returns structured results; file
//! handling belongs to callers. `validate` surfaces as errors exactly the
//! conditions `diff` reports with `validation_failed = true` (plus hard
//! parse failures); everything else is a warning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cheshbon_core::bindings::{
    ambiguous_bindings, invalid_bindings, missing_source_bindings, Bindings, RawSchema,
};
use cheshbon_core::error::SpecValidationError;
use cheshbon_core::graph::DependencyGraph;
use cheshbon_core::registry::TransformRegistry;
use cheshbon_core::spec::MappingSpec;

use crate::binding_impact::apply_binding_impact;
use crate::engine::{diff_registries, diff_specs};
use crate::event::{sort_events, ChangeEvent};
use crate::impact::{compute_impact, finalize, ReasonCode};

/// How much explanatory detail a diff carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Impacted/unaffected sets, events, and reasons only.
    Core,
    /// Core plus dependency paths and alternative-path counts.
    Full,
}

/// Stable result of a diff analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    /// True when the change set is not executable (missing transform refs,
    /// ambiguous bindings). Impact is still computed and reported.
    pub validation_failed: bool,
    /// Sorted, deduplicated validation error messages.
    pub validation_errors: Vec<String>,
    /// Event-kind name -> count.
    pub change_summary: BTreeMap<String, usize>,
    /// Impacted node IDs, ascending.
    pub impacted_ids: Vec<String>,
    /// Unimpacted node IDs, ascending.
    pub unaffected_ids: Vec<String>,
    /// Per impacted node: primary reason first, remaining reasons in
    /// lexicographic order.
    pub reasons: BTreeMap<String, Vec<ReasonCode>>,
    /// Per impacted node: deterministic shortest path from the nearest seed.
    /// Empty at `DetailLevel::Core`.
    pub paths: BTreeMap<String, Vec<String>>,
    /// Node -> input IDs that no longer resolve.
    pub missing_inputs: BTreeMap<String, Vec<String>>,
    /// Node -> required source IDs with no binding.
    pub missing_bindings: BTreeMap<String, Vec<String>>,
    /// Node -> required source IDs with ambiguous bindings.
    pub ambiguous_bindings: BTreeMap<String, Vec<String>>,
    /// Node -> transform refs absent from the registry.
    pub missing_transform_refs: BTreeMap<String, Vec<String>>,
    /// Node -> count of alternative dependency paths (diamonds). Empty at
    /// `DetailLevel::Core`.
    pub alt_path_counts: BTreeMap<String, usize>,
    /// Dependency cycles found in either graph, each normalized to start at
    /// its lexicographically smallest member. Cycles indicate a bad spec but
    /// never abort impact computation.
    pub cycles: Vec<Vec<String>>,
    /// The ordered change-event stream.
    pub events: Vec<ChangeEvent>,
    /// Node -> binding problems (missing + ambiguous source IDs merged).
    /// Populated only when bindings were supplied.
    pub binding_issues: BTreeMap<String, Vec<String>>,
    /// Source ID -> raw columns bound to it that the schema does not have.
    /// Populated only when bindings and a raw schema were supplied.
    pub invalid_bindings: BTreeMap<String, Vec<String>>,
}

impl DiffResult {
    /// Whether any node is impacted.
    pub fn has_impact(&self) -> bool {
        !self.impacted_ids.is_empty()
    }

    /// Process exit code contract: 0 no impact, 1 impact, 2 validation
    /// failed.
    pub fn exit_code(&self) -> i32 {
        if self.validation_failed {
            2
        } else if self.has_impact() {
            1
        } else {
            0
        }
    }
}

/// Diff two specs (and optionally two registries, bindings, and a raw
/// schema) into a [`DiffResult`].
///
/// Registries are supplied both-or-neither; the tuple makes half-supplied
/// registries unrepresentable.
pub fn diff(
    from_spec: &MappingSpec,
    to_spec: &MappingSpec,
    registries: Option<(&TransformRegistry, &TransformRegistry)>,
    bindings: Option<&Bindings>,
    raw_schema: Option<&RawSchema>,
    detail: DetailLevel,
) -> DiffResult {
    let graph_v1 = DependencyGraph::build(from_spec);
    let graph_v2 = DependencyGraph::build(to_spec);

    let mut events = diff_specs(from_spec, to_spec);
    if let Some((registry_v1, registry_v2)) = registries {
        events.extend(diff_registries(registry_v1, registry_v2));
    }
    sort_events(&mut events);

    let mut state = compute_impact(
        from_spec,
        to_spec,
        &graph_v1,
        &graph_v2,
        &events,
        registries.map(|(_, registry_v2)| registry_v2),
    );
    if let Some(bindings) = bindings {
        apply_binding_impact(&mut state, to_spec, &graph_v2, bindings);
    }

    let outcome = finalize(
        state,
        from_spec,
        to_spec,
        &graph_v1,
        &graph_v2,
        detail == DetailLevel::Full,
    );

    let mut change_summary: BTreeMap<String, usize> = BTreeMap::new();
    for event in &events {
        *change_summary.entry(event.kind.as_str().to_string()).or_default() += 1;
    }

    let mut binding_issues: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if bindings.is_some() {
        for (node, sources) in outcome
            .missing_bindings
            .iter()
            .chain(outcome.ambiguous_bindings.iter())
        {
            let merged = binding_issues.entry(node.clone()).or_default();
            merged.extend(sources.iter().cloned());
            merged.sort();
            merged.dedup();
        }
    }

    let mut cycles: Vec<Vec<String>> = graph_v1.cycles().to_vec();
    for cycle in graph_v2.cycles() {
        if !cycles.contains(cycle) {
            cycles.push(cycle.clone());
        }
    }
    cycles.sort();

    let mut invalid = BTreeMap::new();
    if let (Some(bindings), Some(schema)) = (bindings, raw_schema) {
        let (issues, _unmapped) = invalid_bindings(schema, bindings);
        for issue in issues {
            let columns: &mut Vec<String> = invalid.entry(issue.source_id).or_default();
            columns.push(issue.raw_column);
            columns.sort();
        }
    }

    DiffResult {
        validation_failed: outcome.validation_failed,
        validation_errors: outcome.validation_errors,
        change_summary,
        impacted_ids: outcome.impacted,
        unaffected_ids: outcome.unaffected,
        reasons: outcome.reasons,
        paths: outcome.paths,
        missing_inputs: outcome.missing_inputs,
        missing_bindings: outcome.missing_bindings,
        ambiguous_bindings: outcome.ambiguous_bindings,
        missing_transform_refs: outcome.missing_transform_refs,
        alt_path_counts: outcome.alt_path_counts,
        cycles,
        events,
        binding_issues,
        invalid_bindings: invalid,
    }
}

/// Stable validation issue codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    InvalidStructure,
    InvalidIdFormat,
    DuplicateId,
    ParamsTooLarge,
    ParamsNotCanonical,
    ParamsLarge,
    UnresolvedReference,
    CycleDetected,
    RegistryInvalid,
    MissingTransformRef,
    BindingsInvalid,
    MissingBinding,
    AmbiguousBinding,
    RawSchemaInvalid,
    InvalidRawColumn,
}

impl IssueCode {
    /// Wire name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::InvalidStructure => "INVALID_STRUCTURE",
            IssueCode::InvalidIdFormat => "INVALID_ID_FORMAT",
            IssueCode::DuplicateId => "DUPLICATE_ID",
            IssueCode::ParamsTooLarge => "PARAMS_TOO_LARGE",
            IssueCode::ParamsNotCanonical => "PARAMS_NOT_CANONICAL",
            IssueCode::ParamsLarge => "PARAMS_LARGE",
            IssueCode::UnresolvedReference => "UNRESOLVED_REFERENCE",
            IssueCode::CycleDetected => "CYCLE_DETECTED",
            IssueCode::RegistryInvalid => "REGISTRY_INVALID",
            IssueCode::MissingTransformRef => "MISSING_TRANSFORM_REF",
            IssueCode::BindingsInvalid => "BINDINGS_INVALID",
            IssueCode::MissingBinding => "MISSING_BINDING",
            IssueCode::AmbiguousBinding => "AMBIGUOUS_BINDING",
            IssueCode::RawSchemaInvalid => "RAW_SCHEMA_INVALID",
            IssueCode::InvalidRawColumn => "INVALID_RAW_COLUMN",
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Stable issue code.
    pub code: IssueCode,
    /// Human-readable description.
    pub message: String,
    /// The element the issue is about, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    /// The ID that failed to resolve, for reference issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_id: Option<String>,
    /// Participating nodes, for cycle issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_path: Option<Vec<String>>,
    /// The raw column involved, for binding issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_column: Option<String>,
}

impl ValidationIssue {
    fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            element_id: None,
            missing_id: None,
            cycle_path: None,
            raw_column: None,
        }
    }

    fn with_element(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    fn sort_key(&self) -> (&'static str, String, String, String) {
        (
            self.code.as_str(),
            self.element_id.clone().unwrap_or_default(),
            self.missing_id.clone().unwrap_or_default(),
            self.raw_column.clone().unwrap_or_default(),
        )
    }
}

/// Result of a preflight validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when there are no blocking errors. Warnings never block.
    pub ok: bool,
    /// Blocking issues.
    pub errors: Vec<ValidationIssue>,
    /// Non-blocking issues.
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a spec (and optional registry, bindings, raw schema) without
/// computing a diff. Read-only; no side effects.
pub fn validate(
    spec: &Value,
    registry: Option<&Value>,
    bindings: Option<&Value>,
    raw_schema: Option<&Value>,
) -> ValidationResult {
    let mut errors: Vec<ValidationIssue> = Vec::new();
    let mut warnings: Vec<ValidationIssue> = Vec::new();

    let spec_obj = match MappingSpec::from_value(spec) {
        Ok(spec_obj) => spec_obj,
        Err(err) => {
            errors.push(issue_from_spec_error(&err));
            return ValidationResult {
                ok: false,
                errors,
                warnings,
            };
        }
    };

    for (derived_id, bytes) in spec_obj.oversized_params() {
        warnings.push(
            ValidationIssue::new(
                IssueCode::ParamsLarge,
                format!(
                    "params for derived variable '{derived_id}' are large ({bytes} bytes \
                     canonical JSON); params should be small and schema-governed"
                ),
            )
            .with_element(derived_id),
        );
    }

    let graph = DependencyGraph::build(&spec_obj);
    for (element_id, references) in graph.unresolved() {
        for reference in references {
            let mut issue = ValidationIssue::new(
                IssueCode::UnresolvedReference,
                format!("input reference '{reference}' of '{element_id}' not found in spec"),
            )
            .with_element(element_id.clone());
            issue.missing_id = Some(reference.clone());
            warnings.push(issue);
        }
    }
    for cycle in graph.cycles() {
        let mut issue = ValidationIssue::new(
            IssueCode::CycleDetected,
            format!("cycle detected in dependency graph: {}", cycle.join(" -> ")),
        );
        issue.cycle_path = Some(cycle.clone());
        warnings.push(issue);
    }

    if let Some(registry_value) = registry {
        match TransformRegistry::from_value(registry_value) {
            Ok(registry_obj) => {
                for derived in &spec_obj.derived {
                    let Some(transform_ref) = &derived.transform_ref else {
                        continue;
                    };
                    if !registry_obj.contains(transform_ref) {
                        let mut issue = ValidationIssue::new(
                            IssueCode::MissingTransformRef,
                            format!(
                                "derived variable '{}' ({}) references missing transform \
                                 '{transform_ref}': not found in registry",
                                derived.id, derived.name
                            ),
                        )
                        .with_element(derived.id.clone());
                        issue.missing_id = Some(transform_ref.clone());
                        errors.push(issue);
                    }
                }
            }
            Err(err) => {
                errors.push(ValidationIssue::new(
                    IssueCode::RegistryInvalid,
                    format!("failed to validate registry: {err}"),
                ));
            }
        }
    }

    if let Some(bindings_value) = bindings {
        match serde_json::from_value::<Bindings>(bindings_value.clone()) {
            Ok(bindings_obj) => {
                let required = cheshbon_core::bindings::required_source_ids(&spec_obj);
                for (source_id, raw_columns) in ambiguous_bindings(&bindings_obj) {
                    if !required.contains(&source_id) {
                        continue;
                    }
                    errors.push(
                        ValidationIssue::new(
                            IssueCode::AmbiguousBinding,
                            format!(
                                "source '{source_id}' is bound to multiple raw columns: {}",
                                raw_columns.join(", ")
                            ),
                        )
                        .with_element(source_id),
                    );
                }
                for source_id in missing_source_bindings(&spec_obj, &bindings_obj) {
                    warnings.push(
                        ValidationIssue::new(
                            IssueCode::MissingBinding,
                            format!("required source '{source_id}' has no binding"),
                        )
                        .with_element(source_id),
                    );
                }
                if let Some(raw_schema_value) = raw_schema {
                    match serde_json::from_value::<RawSchema>(raw_schema_value.clone()) {
                        Ok(schema_obj) => {
                            let (issues, _unmapped) = invalid_bindings(&schema_obj, &bindings_obj);
                            for issue in issues {
                                let mut finding = ValidationIssue::new(
                                    IssueCode::InvalidRawColumn,
                                    issue.detail.clone(),
                                )
                                .with_element(issue.source_id);
                                finding.raw_column = Some(issue.raw_column);
                                warnings.push(finding);
                            }
                        }
                        Err(err) => {
                            warnings.push(ValidationIssue::new(
                                IssueCode::RawSchemaInvalid,
                                format!("failed to parse raw schema: {err}; binding validation against schema skipped"),
                            ));
                        }
                    }
                }
            }
            Err(err) => {
                warnings.push(ValidationIssue::new(
                    IssueCode::BindingsInvalid,
                    format!("failed to parse bindings: {err}; binding validation skipped"),
                ));
            }
        }
    }

    errors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    warnings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    let ok = errors.is_empty();
    ValidationResult {
        ok,
        errors,
        warnings,
    }
}

fn issue_from_spec_error(err: &SpecValidationError) -> ValidationIssue {
    let code = match err {
        SpecValidationError::InvalidStructure(_) => IssueCode::InvalidStructure,
        SpecValidationError::InvalidIdFormat { .. } => IssueCode::InvalidIdFormat,
        SpecValidationError::DuplicateId(_) => IssueCode::DuplicateId,
        SpecValidationError::UnresolvedReference { .. } => IssueCode::UnresolvedReference,
        SpecValidationError::ParamsTooLarge { .. } => IssueCode::ParamsTooLarge,
        SpecValidationError::ParamsNotCanonical { .. } => IssueCode::ParamsNotCanonical,
        SpecValidationError::AbsoluteImplRef(_) => IssueCode::InvalidStructure,
    };
    let element = match err {
        SpecValidationError::DuplicateId(id) => Some(id.clone()),
        SpecValidationError::InvalidIdFormat { id, .. } => Some(id.clone()),
        SpecValidationError::ParamsTooLarge { id, .. }
        | SpecValidationError::ParamsNotCanonical { id, .. } => Some(id.clone()),
        SpecValidationError::UnresolvedReference { element_id, .. } => Some(element_id.clone()),
        _ => None,
    };
    let mut issue = ValidationIssue::new(code, err.to_string());
    issue.element_id = element;
    issue
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_value() -> Value {
        json!({
            "schema_version": "0.7",
            "sources": [{"id": "s:SEX_RAW", "name": "SEX_RAW", "type": "string"}],
            "derived": [{
                "id": "d:SEX",
                "name": "SEX",
                "type": "string",
                "inputs": ["s:SEX_RAW"],
                "transform_ref": "t:ct_map",
                "params": {"map": {"M": "M"}}
            }],
        })
    }

    fn registry_value() -> Value {
        json!({
            "registry_version": "1.0.0",
            "transforms": [{
                "id": "t:ct_map",
                "version": "1.0.0",
                "kind": "builtin",
                "signature": {"inputs": ["string"], "output": "string"},
                "impl_fingerprint": {
                    "algo": "sha256",
                    "source": "builtin",
                    "ref": "transforms/ct_map.py",
                    "digest": "a".repeat(64)
                }
            }]
        })
    }

    #[test]
    fn clean_spec_validates_ok() {
        let result = validate(&spec_value(), Some(&registry_value()), None, None);
        assert!(result.ok, "unexpected errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn missing_transform_ref_is_an_error() {
        let mut registry = registry_value();
        registry["transforms"][0]["id"] = json!("t:other");
        let result = validate(&spec_value(), Some(&registry), None, None);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, IssueCode::MissingTransformRef);
    }

    #[test]
    fn ambiguous_binding_is_an_error_missing_is_a_warning() {
        let bindings = json!({
            "table": "RAW",
            "bindings": {"SEX_A": "s:SEX_RAW", "SEX_B": "s:SEX_RAW"}
        });
        let result = validate(&spec_value(), None, Some(&bindings), None);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, IssueCode::AmbiguousBinding);

        let bindings = json!({"table": "RAW", "bindings": {}});
        let result = validate(&spec_value(), None, Some(&bindings), None);
        assert!(result.ok);
        assert_eq!(result.warnings[0].code, IssueCode::MissingBinding);
    }

    #[test]
    fn cycle_and_unresolved_are_warnings() {
        let spec = json!({
            "schema_version": "0.7",
            "sources": [],
            "derived": [
                {"id": "d:A", "name": "A", "type": "string",
                 "inputs": ["d:B", "s:GHOST"], "transform_ref": "t:x"},
                {"id": "d:B", "name": "B", "type": "string",
                 "inputs": ["d:A"], "transform_ref": "t:x"}
            ],
        });
        let result = validate(&spec, None, None, None);
        assert!(result.ok, "cycles and unresolved refs do not block");
        let codes: Vec<IssueCode> = result.warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&IssueCode::CycleDetected));
        assert!(codes.contains(&IssueCode::UnresolvedReference));
    }

    #[test]
    fn duplicate_id_is_an_error() {
        let mut spec = spec_value();
        let dup = spec["sources"][0].clone();
        spec["sources"].as_array_mut().unwrap().push(dup);
        let result = validate(&spec, None, None, None);
        assert!(!result.ok);
        assert_eq!(result.errors[0].code, IssueCode::DuplicateId);
    }

    #[test]
    fn invalid_raw_column_is_a_warning() {
        let bindings = json!({"table": "RAW", "bindings": {"GONE": "s:SEX_RAW"}});
        let schema = json!({"table": "RAW", "columns": [{"name": "SEX_A", "type": "string"}]});
        let result = validate(&spec_value(), None, Some(&bindings), Some(&schema));
        let codes: Vec<IssueCode> = result.warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&IssueCode::InvalidRawColumn));
        assert!(codes.contains(&IssueCode::MissingBinding));
    }

    #[test]
    fn diff_exit_codes() {
        let v1 = MappingSpec::from_value(&spec_value()).unwrap();
        let result = diff(&v1, &v1, None, None, None, DetailLevel::Full);
        assert_eq!(result.exit_code(), 0);

        let mut changed = spec_value();
        changed["derived"][0]["params"] = json!({"map": {"M": "MALE"}});
        let v2 = MappingSpec::from_value(&changed).unwrap();
        let result = diff(&v1, &v2, None, None, None, DetailLevel::Full);
        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.change_summary["DERIVED_TRANSFORM_PARAMS_CHANGED"], 1);
    }

    #[test]
    fn core_detail_omits_paths() {
        let v1 = MappingSpec::from_value(&spec_value()).unwrap();
        let mut changed = spec_value();
        changed["derived"][0]["params"] = json!({"map": {"M": "MALE"}});
        let v2 = MappingSpec::from_value(&changed).unwrap();

        let core = diff(&v1, &v2, None, None, None, DetailLevel::Core);
        assert!(core.paths.is_empty());
        assert!(core.alt_path_counts.is_empty());
        assert!(!core.reasons.is_empty());

        let full = diff(&v1, &v2, None, None, None, DetailLevel::Full);
        assert!(!full.paths.is_empty());
    }

    #[test]
    fn cycles_surface_in_the_result() {
        let cyclic = json!({
            "schema_version": "0.7",
            "sources": [],
            "derived": [
                {"id": "d:A", "name": "A", "type": "string",
                 "inputs": ["d:B"], "transform_ref": "t:x"},
                {"id": "d:B", "name": "B", "type": "string",
                 "inputs": ["d:A"], "transform_ref": "t:x"}
            ],
        });
        let v = MappingSpec::from_value(&cyclic).unwrap();
        let result = diff(&v, &v, None, None, None, DetailLevel::Full);
        assert_eq!(
            result.cycles,
            vec![vec!["d:A".to_string(), "d:B".to_string()]]
        );
        // A cycle alone is reported, not impacting and not a failure.
        assert!(result.impacted_ids.is_empty());
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn binding_issues_merged_per_node() {
        let spec = MappingSpec::from_value(&spec_value()).unwrap();
        let bindings = Bindings {
            table: "RAW".into(),
            bindings: BTreeMap::new(),
        };
        let result = diff(&spec, &spec, None, Some(&bindings), None, DetailLevel::Full);
        assert_eq!(result.binding_issues["d:SEX"], vec!["s:SEX_RAW"]);
    }
}
