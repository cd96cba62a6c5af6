//! Structural diff between two spec versions and two registry versions.
//!
//! Identity is tracked by stable ID, never by display name. Renames emit
//! only `*_RENAMED` metadata events; input lists compare as sets (they are
//! canonicalized sorted at load); registry comparison reads the current
//! `impl_fingerprint.digest` only.

use std::collections::BTreeMap;

use serde_json::json;

use cheshbon_core::registry::TransformRegistry;
use cheshbon_core::spec::MappingSpec;

use crate::event::{ChangeEvent, ChangeKind};

/// Compute the structural diff between two mapping specs.
pub fn diff_specs(spec_v1: &MappingSpec, spec_v2: &MappingSpec) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    let sources_v1: BTreeMap<&str, _> = spec_v1.sources.iter().map(|s| (s.id.as_str(), s)).collect();
    let sources_v2: BTreeMap<&str, _> = spec_v2.sources.iter().map(|s| (s.id.as_str(), s)).collect();

    for (id, source) in &sources_v1 {
        if !sources_v2.contains_key(id) {
            events.push(ChangeEvent::new(
                ChangeKind::SourceRemoved,
                *id,
                Some(source.name.clone()),
                None,
            ));
        }
    }
    for (id, source) in &sources_v2 {
        if !sources_v1.contains_key(id) {
            events.push(ChangeEvent::new(
                ChangeKind::SourceAdded,
                *id,
                None,
                Some(source.name.clone()),
            ));
        }
    }
    for (id, s1) in &sources_v1 {
        let Some(s2) = sources_v2.get(id) else {
            continue;
        };
        if s1.name != s2.name {
            events.push(ChangeEvent::new(
                ChangeKind::SourceRenamed,
                *id,
                Some(s1.name.clone()),
                Some(s2.name.clone()),
            ));
        }
    }

    let derived_v1: BTreeMap<&str, _> = spec_v1.derived.iter().map(|d| (d.id.as_str(), d)).collect();
    let derived_v2: BTreeMap<&str, _> = spec_v2.derived.iter().map(|d| (d.id.as_str(), d)).collect();

    for (id, derived) in &derived_v1 {
        if !derived_v2.contains_key(id) {
            events.push(ChangeEvent::new(
                ChangeKind::DerivedRemoved,
                *id,
                Some(derived.name.clone()),
                None,
            ));
        }
    }
    for (id, derived) in &derived_v2 {
        if !derived_v1.contains_key(id) {
            events.push(ChangeEvent::new(
                ChangeKind::DerivedAdded,
                *id,
                None,
                Some(derived.name.clone()),
            ));
        }
    }
    for (id, d1) in &derived_v1 {
        let Some(d2) = derived_v2.get(id) else {
            continue;
        };

        if d1.name != d2.name {
            events.push(ChangeEvent::new(
                ChangeKind::DerivedRenamed,
                *id,
                Some(d1.name.clone()),
                Some(d2.name.clone()),
            ));
        }

        // Ref and params changes are orthogonal: both fire when both
        // actually changed; equal digests suppress the params event.
        if d1.transform_ref != d2.transform_ref {
            events.push(ChangeEvent::new(
                ChangeKind::DerivedTransformRefChanged,
                *id,
                d1.transform_ref.clone(),
                d2.transform_ref.clone(),
            ));
        }
        if d1.params_hash() != d2.params_hash() {
            events.push(
                ChangeEvent::new(
                    ChangeKind::DerivedTransformParamsChanged,
                    *id,
                    Some(d1.params_hash().to_string()),
                    Some(d2.params_hash().to_string()),
                )
                .with_details(json!({ "transform_ref": d2.transform_ref })),
            );
        }

        if d1.column_type != d2.column_type {
            events.push(ChangeEvent::new(
                ChangeKind::DerivedTypeChanged,
                *id,
                Some(d1.column_type.clone()),
                Some(d2.column_type.clone()),
            ));
        }

        // Inputs are canonicalized sorted at load; plain equality is set
        // equality, so reordering alone never lands here.
        if d1.inputs != d2.inputs {
            events.push(
                ChangeEvent::new(
                    ChangeKind::DerivedInputsChanged,
                    *id,
                    Some(render_inputs(&d1.inputs)),
                    Some(render_inputs(&d2.inputs)),
                )
                .with_details(json!({
                    "old_inputs": d1.inputs,
                    "new_inputs": d2.inputs,
                })),
            );
        }
    }

    let constraints_v1: BTreeMap<&str, _> =
        spec_v1.constraints.iter().map(|c| (c.id.as_str(), c)).collect();
    let constraints_v2: BTreeMap<&str, _> =
        spec_v2.constraints.iter().map(|c| (c.id.as_str(), c)).collect();

    for (id, constraint) in &constraints_v1 {
        if !constraints_v2.contains_key(id) {
            events.push(ChangeEvent::new(
                ChangeKind::ConstraintRemoved,
                *id,
                Some(constraint.name.clone()),
                None,
            ));
        }
    }
    for (id, constraint) in &constraints_v2 {
        if !constraints_v1.contains_key(id) {
            events.push(ChangeEvent::new(
                ChangeKind::ConstraintAdded,
                *id,
                None,
                Some(constraint.name.clone()),
            ));
        }
    }
    for (id, c1) in &constraints_v1 {
        let Some(c2) = constraints_v2.get(id) else {
            continue;
        };

        if c1.name != c2.name {
            events.push(ChangeEvent::new(
                ChangeKind::ConstraintRenamed,
                *id,
                Some(c1.name.clone()),
                Some(c2.name.clone()),
            ));
        }
        if c1.inputs != c2.inputs {
            events.push(
                ChangeEvent::new(
                    ChangeKind::ConstraintInputsChanged,
                    *id,
                    Some(render_inputs(&c1.inputs)),
                    Some(render_inputs(&c2.inputs)),
                )
                .with_details(json!({
                    "old_inputs": c1.inputs,
                    "new_inputs": c2.inputs,
                })),
            );
        }
        if c1.expression != c2.expression {
            events.push(ChangeEvent::new(
                ChangeKind::ConstraintExpressionChanged,
                *id,
                c1.expression.clone(),
                c2.expression.clone(),
            ));
        }
    }

    events
}

/// Compute the structural diff between two transform registries.
///
/// `impl_fingerprint.digest` is authoritative: churn in `version`, `source`,
/// or `ref` alone emits nothing.
pub fn diff_registries(
    registry_v1: &TransformRegistry,
    registry_v2: &TransformRegistry,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    let transforms_v1: BTreeMap<&str, _> =
        registry_v1.transforms.iter().map(|t| (t.id.as_str(), t)).collect();
    let transforms_v2: BTreeMap<&str, _> =
        registry_v2.transforms.iter().map(|t| (t.id.as_str(), t)).collect();

    for (id, transform) in &transforms_v2 {
        if !transforms_v1.contains_key(id) {
            events.push(ChangeEvent::new(
                ChangeKind::TransformAdded,
                *id,
                None,
                Some(transform.version.clone()),
            ));
        }
    }
    for (id, transform) in &transforms_v1 {
        if !transforms_v2.contains_key(id) {
            events.push(ChangeEvent::new(
                ChangeKind::TransformRemoved,
                *id,
                Some(transform.version.clone()),
                None,
            ));
        }
    }
    for (id, t1) in &transforms_v1 {
        let Some(t2) = transforms_v2.get(id) else {
            continue;
        };
        if t1.impl_fingerprint.digest != t2.impl_fingerprint.digest {
            events.push(
                ChangeEvent::new(
                    ChangeKind::TransformImplChanged,
                    *id,
                    Some(t1.impl_fingerprint.digest.clone()),
                    Some(t2.impl_fingerprint.digest.clone()),
                )
                .with_details(json!({
                    "old_source": t1.impl_fingerprint.source,
                    "new_source": t2.impl_fingerprint.source,
                    "old_ref": t1.impl_fingerprint.reference,
                    "new_ref": t2.impl_fingerprint.reference,
                    "old_version": t1.version,
                    "new_version": t2.version,
                })),
            );
        }
    }

    events
}

fn render_inputs(inputs: &[String]) -> String {
    serde_json::to_string(inputs).unwrap_or_default()
}
