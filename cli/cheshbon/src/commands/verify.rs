//! The `cheshbon verify` subcommands: artifact and report verification.

use std::path::Path;

use serde_json::json;

use cheshbon_core::bindings::{ambiguous_bindings, invalid_bindings, missing_source_bindings};
use cheshbon_core::registry::TransformRegistry;
use cheshbon_core::spec::MappingSpec;
use cheshbon_diff::validate;
use cheshbon_verify::{verify_report, ReportInputs, VerifyOutcome};

use super::{load_bindings, load_raw_schema, load_registry, load_spec, load_value, print_canonical};

/// Verify an all-details report against its input artifacts.
#[allow(clippy::too_many_arguments)]
pub fn report(
    report_path: &Path,
    from_spec: &Path,
    to_spec: &Path,
    from_registry: Option<&Path>,
    to_registry: Option<&Path>,
    bindings: Option<&Path>,
    raw_schema: Option<&Path>,
) -> anyhow::Result<i32> {
    let report = load_value(report_path)?;
    let spec_v1 = load_spec(from_spec)?;
    let spec_v2 = load_spec(to_spec)?;
    let registry_v1 = from_registry.map(load_registry).transpose()?;
    let registry_v2 = to_registry.map(load_registry).transpose()?;
    let bindings = bindings.map(load_bindings).transpose()?;
    let raw_schema = raw_schema.map(load_raw_schema).transpose()?;

    let inputs = ReportInputs {
        from_spec: &spec_v1,
        to_spec: &spec_v2,
        registry_v1: registry_v1.as_ref(),
        registry_v2: registry_v2.as_ref(),
        bindings: bindings.as_ref(),
        raw_schema: raw_schema.as_ref(),
    };

    let outcome = verify_report(&report, &inputs)?;
    let (status, detail) = match &outcome {
        VerifyOutcome::Ok => ("OK", json!(null)),
        VerifyOutcome::DigestMismatch { expected, actual } => (
            "DIGEST_MISMATCH",
            json!({"expected": expected, "actual": actual}),
        ),
        VerifyOutcome::WitnessMismatch { node_id, field } => (
            "WITNESS_MISMATCH",
            json!({"node_id": node_id, "field": field}),
        ),
        VerifyOutcome::InputsChanged { input } => ("INPUTS_CHANGED", json!({ "input": input })),
    };
    print_canonical(&json!({"status": status, "detail": detail}))?;

    Ok(if outcome == VerifyOutcome::Ok { 0 } else { 2 })
}

/// Validate a mapping spec with the same checks `diff` relies on.
pub fn spec(
    spec_path: &Path,
    registry: Option<&Path>,
    bindings: Option<&Path>,
    raw_schema: Option<&Path>,
) -> anyhow::Result<i32> {
    let spec_value = load_value(spec_path)?;
    let registry_value = registry.map(load_value).transpose()?;
    let bindings_value = bindings.map(load_value).transpose()?;
    let raw_schema_value = raw_schema.map(load_value).transpose()?;

    let result = validate(
        &spec_value,
        registry_value.as_ref(),
        bindings_value.as_ref(),
        raw_schema_value.as_ref(),
    );
    print_canonical(&serde_json::to_value(&result)?)?;
    Ok(if result.ok { 0 } else { 2 })
}

/// Validate a transform registry artifact.
pub fn registry(registry_path: &Path) -> anyhow::Result<i32> {
    let value = load_value(registry_path)?;
    match TransformRegistry::from_value(&value) {
        Ok(registry) => {
            print_canonical(&json!({
                "ok": true,
                "transforms": registry.transform_ids(),
            }))?;
            Ok(0)
        }
        Err(err) => {
            print_canonical(&json!({
                "ok": false,
                "error": err.to_string(),
            }))?;
            Ok(2)
        }
    }
}

/// Validate bindings, optionally against a spec and raw schema.
pub fn bindings(
    bindings_path: &Path,
    spec: Option<&Path>,
    raw_schema: Option<&Path>,
) -> anyhow::Result<i32> {
    let bindings = load_bindings(bindings_path)?;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (source_id, raw_columns) in ambiguous_bindings(&bindings) {
        errors.push(json!({
            "code": "AMBIGUOUS_BINDING",
            "element_id": source_id,
            "message": format!(
                "source '{source_id}' is bound to multiple raw columns: {}",
                raw_columns.join(", ")
            ),
        }));
    }

    if let Some(spec_path) = spec {
        let spec_obj: MappingSpec = load_spec(spec_path)?;
        for source_id in missing_source_bindings(&spec_obj, &bindings) {
            warnings.push(json!({
                "code": "MISSING_BINDING",
                "element_id": source_id,
                "message": format!("required source '{source_id}' has no binding"),
            }));
        }
    }

    if let Some(schema_path) = raw_schema {
        let schema = load_raw_schema(schema_path)?;
        let (issues, _unmapped) = invalid_bindings(&schema, &bindings);
        for issue in issues {
            warnings.push(json!({
                "code": "INVALID_RAW_COLUMN",
                "element_id": issue.source_id,
                "raw_column": issue.raw_column,
                "message": issue.detail,
            }));
        }
    }

    let ok = errors.is_empty();
    print_canonical(&json!({"ok": ok, "errors": errors, "warnings": warnings}))?;
    Ok(if ok { 0 } else { 2 })
}
