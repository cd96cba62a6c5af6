//! Independent verification of all-details reports.
//!
//! The verifier never trusts a stored field: it recomputes the content hash
//! over the presented body, re-digests the input artifacts, and re-derives
//! the entire report from scratch to compare witnesses field by field.

use serde_json::{Map, Value};

use cheshbon_core::error::CanonicalizationError;
use cheshbon_diff::{diff, DetailLevel};
use thiserror::Error;

use crate::report::{build_report, content_hash, inputs_digest, ReportInputs, ReportMode};

/// Outcome of verifying an all-details report against its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Every digest and witness re-derives to the stored value.
    Ok,
    /// The report body does not hash to its stored `content_hash`, or a
    /// non-witness field differs from the re-derivation.
    DigestMismatch {
        /// Recomputed digest.
        expected: String,
        /// Digest stored in (or implied by) the report.
        actual: String,
    },
    /// A witness field differs from its re-derivation.
    WitnessMismatch {
        /// The impacted node whose witness failed.
        node_id: String,
        /// The first differing field.
        field: String,
    },
    /// The supplied input artifacts are not the ones the report was
    /// computed from.
    InputsChanged {
        /// The first input key whose digest differs.
        input: String,
    },
}

/// Errors for reports too malformed to verify at all.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The report is not an all-details report object.
    #[error("malformed report: {0}")]
    MalformedReport(String),

    /// Re-derivation failed to canonicalize.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
}

/// Verify an all-details report against the original input artifacts.
pub fn verify_report(
    report: &Value,
    inputs: &ReportInputs<'_>,
) -> Result<VerifyOutcome, VerifyError> {
    let object = report
        .as_object()
        .ok_or_else(|| VerifyError::MalformedReport("report is not a JSON object".into()))?;
    let stored_hash = object
        .get("content_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| VerifyError::MalformedReport("missing content_hash".into()))?
        .to_string();

    // 1. The stored hash must cover the presented body.
    let mut body = object.clone();
    body.remove("content_hash");
    let recomputed = content_hash(&Value::Object(body))?;
    if recomputed != stored_hash {
        return Ok(VerifyOutcome::DigestMismatch {
            expected: recomputed,
            actual: stored_hash,
        });
    }

    // 2. The supplied artifacts must digest to the report's inputs.
    let expected_inputs = inputs_digest(inputs)?;
    let stored_inputs = object.get("inputs_digest").cloned().unwrap_or(Value::Null);
    if let Some(input) = first_differing_key(&expected_inputs, &stored_inputs) {
        return Ok(VerifyOutcome::InputsChanged { input });
    }

    // 3. Re-derive the whole report and compare witnesses field by field.
    let fresh = diff(
        inputs.from_spec,
        inputs.to_spec,
        inputs.registries(),
        inputs.bindings,
        inputs.raw_schema,
        DetailLevel::Full,
    );
    let rebuilt = build_report(ReportMode::AllDetails, &fresh, inputs)?;
    let rebuilt_object = rebuilt
        .as_object()
        .expect("build_report returns an object");

    if let Some(outcome) = compare_witnesses(object, rebuilt_object) {
        return Ok(outcome);
    }

    // 4. Anything else that differs (events, impacted, reasons, paths) was
    // tampered with a consistently recomputed hash.
    let mut rebuilt_body = rebuilt_object.clone();
    rebuilt_body.remove("content_hash");
    let rederived = content_hash(&Value::Object(rebuilt_body))?;
    if rederived != stored_hash {
        return Ok(VerifyOutcome::DigestMismatch {
            expected: rederived,
            actual: stored_hash,
        });
    }

    Ok(VerifyOutcome::Ok)
}

/// First key (sorted) at which the two digest maps disagree.
fn first_differing_key(expected: &Value, stored: &Value) -> Option<String> {
    let empty = Map::new();
    let expected = expected.as_object().unwrap_or(&empty);
    let stored = stored.as_object().unwrap_or(&empty);

    let mut keys: Vec<&String> = expected.keys().chain(stored.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        if expected.get(key) != stored.get(key) {
            return Some(key.clone());
        }
    }
    None
}

const WITNESS_FIELDS: [&str; 5] = [
    "primary_reason",
    "all_reasons",
    "path",
    "alt_path_count",
    "source_events",
];

fn compare_witnesses(
    stored: &Map<String, Value>,
    rebuilt: &Map<String, Value>,
) -> Option<VerifyOutcome> {
    let empty = Vec::new();
    let stored_witnesses = stored
        .get("witnesses")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let rebuilt_witnesses = rebuilt
        .get("witnesses")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let index_by_id = |witnesses: &[Value]| -> Map<String, Value> {
        let mut map = Map::new();
        for witness in witnesses {
            if let Some(id) = witness.get("id").and_then(Value::as_str) {
                map.insert(id.to_string(), witness.clone());
            }
        }
        map
    };
    let stored_by_id = index_by_id(stored_witnesses);
    let rebuilt_by_id = index_by_id(rebuilt_witnesses);

    let mut ids: Vec<&String> = stored_by_id.keys().chain(rebuilt_by_id.keys()).collect();
    ids.sort();
    ids.dedup();

    for id in ids {
        let (Some(stored_witness), Some(rebuilt_witness)) =
            (stored_by_id.get(id), rebuilt_by_id.get(id))
        else {
            return Some(VerifyOutcome::WitnessMismatch {
                node_id: id.clone(),
                field: "id".into(),
            });
        };
        for field in WITNESS_FIELDS {
            if stored_witness.get(field) != rebuilt_witness.get(field) {
                return Some(VerifyOutcome::WitnessMismatch {
                    node_id: id.clone(),
                    field: field.into(),
                });
            }
        }
    }
    None
}
