//! Report assembly: `core`, `full`, and `all-details` modes over one
//! [`DiffResult`].
//!
//! The all-details artifact is self-evidencing: `inputs_digest` pins the
//! artifacts it was computed from and `content_hash` covers the report body
//! with that single field excluded. Two invocations on identical inputs
//! produce byte-identical bodies.

use serde_json::{json, Map, Value};

use cheshbon_core::bindings::{Bindings, RawSchema};
use cheshbon_core::canonical::digest_value;
use cheshbon_core::error::CanonicalizationError;
use cheshbon_core::registry::TransformRegistry;
use cheshbon_core::spec::MappingSpec;
use cheshbon_diff::DiffResult;

use crate::witness::{compute_witnesses, event_id};

/// Schema version tag carried by every report.
pub const REPORT_SCHEMA_VERSION: &str = "0.1";

/// Which report shape to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Impacted/unaffected sets, events, and reasons.
    Core,
    /// Core plus dependency paths and alternative-path counts.
    Full,
    /// Full plus input digests, witnesses, and a content hash.
    AllDetails,
}

impl ReportMode {
    /// Wire name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            ReportMode::Core => "core",
            ReportMode::Full => "full",
            ReportMode::AllDetails => "all-details",
        }
    }
}

/// The input artifacts a report was computed from.
#[derive(Debug, Clone, Copy)]
pub struct ReportInputs<'a> {
    pub from_spec: &'a MappingSpec,
    pub to_spec: &'a MappingSpec,
    pub registry_v1: Option<&'a TransformRegistry>,
    pub registry_v2: Option<&'a TransformRegistry>,
    pub bindings: Option<&'a Bindings>,
    pub raw_schema: Option<&'a RawSchema>,
}

impl<'a> ReportInputs<'a> {
    /// Registries as the both-or-neither pair `diff` expects.
    pub fn registries(&self) -> Option<(&'a TransformRegistry, &'a TransformRegistry)> {
        match (self.registry_v1, self.registry_v2) {
            (Some(v1), Some(v2)) => Some((v1, v2)),
            _ => None,
        }
    }
}

/// Build a report of the requested mode.
pub fn build_report(
    mode: ReportMode,
    result: &DiffResult,
    inputs: &ReportInputs<'_>,
) -> Result<Value, CanonicalizationError> {
    let mut report = Map::new();
    report.insert("schema_version".into(), json!(REPORT_SCHEMA_VERSION));
    report.insert("mode".into(), json!(mode.as_str()));
    report.insert("validation_failed".into(), json!(result.validation_failed));
    report.insert(
        "validation_errors".into(),
        json!(result.validation_errors),
    );
    report.insert("events".into(), events_with_ids(result)?);
    report.insert("impacted".into(), json!(result.impacted_ids));
    report.insert("unaffected".into(), json!(result.unaffected_ids));
    report.insert("reasons".into(), reasons_value(result));

    if mode == ReportMode::Core {
        return Ok(Value::Object(report));
    }

    report.insert("paths".into(), json!(result.paths));
    report.insert("alt_path_counts".into(), json!(result.alt_path_counts));

    if mode == ReportMode::Full {
        return Ok(Value::Object(report));
    }

    report.insert("inputs_digest".into(), inputs_digest(inputs)?);
    let witnesses = compute_witnesses(result, inputs.from_spec, inputs.to_spec)?;
    report.insert(
        "witnesses".into(),
        serde_json::to_value(&witnesses).map_err(|e| CanonicalizationError::NonJsonType {
            detail: e.to_string(),
        })?,
    );

    let body = Value::Object(report.clone());
    report.insert("content_hash".into(), json!(content_hash(&body)?));
    Ok(Value::Object(report))
}

/// Canonical digest of a report body. The caller is responsible for
/// excluding `content_hash` before calling.
pub fn content_hash(body: &Value) -> Result<String, CanonicalizationError> {
    digest_value(body)
}

/// Canonical digests of each supplied input artifact. Absent optional
/// artifacts are omitted.
pub fn inputs_digest(inputs: &ReportInputs<'_>) -> Result<Value, CanonicalizationError> {
    let mut digests = Map::new();
    digests.insert(
        "from_spec".into(),
        json!(digest_model(inputs.from_spec)?),
    );
    digests.insert("to_spec".into(), json!(digest_model(inputs.to_spec)?));
    if let Some(registry) = inputs.registry_v1 {
        digests.insert("registry_v1".into(), json!(digest_model(registry)?));
    }
    if let Some(registry) = inputs.registry_v2 {
        digests.insert("registry_v2".into(), json!(digest_model(registry)?));
    }
    if let Some(bindings) = inputs.bindings {
        digests.insert("bindings".into(), json!(digest_model(bindings)?));
    }
    if let Some(schema) = inputs.raw_schema {
        digests.insert("raw_schema".into(), json!(digest_model(schema)?));
    }
    Ok(Value::Object(digests))
}

fn digest_model<T: serde::Serialize>(model: &T) -> Result<String, CanonicalizationError> {
    let value = serde_json::to_value(model).map_err(|e| CanonicalizationError::NonJsonType {
        detail: e.to_string(),
    })?;
    digest_value(&value)
}

fn events_with_ids(result: &DiffResult) -> Result<Value, CanonicalizationError> {
    let mut events = Vec::with_capacity(result.events.len());
    for event in &result.events {
        let mut value = serde_json::to_value(event).map_err(|e| {
            CanonicalizationError::NonJsonType {
                detail: e.to_string(),
            }
        })?;
        if let Some(object) = value.as_object_mut() {
            object.insert("event_id".into(), json!(event_id(event)?));
        }
        events.push(value);
    }
    Ok(Value::Array(events))
}

fn reasons_value(result: &DiffResult) -> Value {
    json!(result.reasons)
}
