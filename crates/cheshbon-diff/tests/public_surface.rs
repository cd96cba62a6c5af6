//! Boundary test: the public API is an explicit, enumerated list.
//!
//! Everything a caller needs is importable from the crate root; internal
//! machinery (the impact accumulator, binding folding) is not re-exported.
//! If a re-export disappears or an internal type leaks into the root, this
//! file stops compiling.

#[allow(unused_imports)]
use cheshbon_diff::{
    diff, diff_registries, diff_specs, sort_events, validate, ChangeEvent, ChangeKind,
    DetailLevel, DiffResult, IssueCode, ReasonCode, ValidationIssue, ValidationResult,
};

#[allow(unused_imports)]
use cheshbon_core::{
    ambiguous_bindings, binding_status, canonical_json, canonical_json_set_array, digest_value,
    hash_params, invalid_bindings, parse_json_bytes, sha256_hex, BindingError, BindingStatus,
    Bindings, CanonicalizationError, Constraint, DependencyGraph, DerivedVariable, GraphError,
    ImplFingerprint, MappingSpec, RawColumn, RawSchema, RegistryValidationError, Signature,
    SourceColumn, SpecValidationError, TransformEntry, TransformHistoryEntry, TransformRegistry,
};

#[test]
fn reason_codes_cover_the_closed_set() {
    let all = [
        ReasonCode::AmbiguousBinding,
        ReasonCode::MissingTransformRef,
        ReasonCode::MissingBinding,
        ReasonCode::MissingInput,
        ReasonCode::DirectChangeMissingInput,
        ReasonCode::DirectChange,
        ReasonCode::TransformImplChanged,
        ReasonCode::Cycle,
        ReasonCode::TransitiveDependency,
    ];
    // Precedence is strictly decreasing in declaration order.
    for pair in all.windows(2) {
        assert!(pair[0].precedence() > pair[1].precedence());
    }
    // Wire names round-trip through serde.
    for reason in all {
        let value = serde_json::to_value(reason).unwrap();
        assert_eq!(value, reason.as_str());
        let back: ReasonCode = serde_json::from_value(value).unwrap();
        assert_eq!(back, reason);
    }
}

#[test]
fn change_kinds_cover_the_closed_set() {
    let all = [
        ChangeKind::SourceAdded,
        ChangeKind::SourceRemoved,
        ChangeKind::SourceRenamed,
        ChangeKind::DerivedAdded,
        ChangeKind::DerivedRemoved,
        ChangeKind::DerivedRenamed,
        ChangeKind::DerivedInputsChanged,
        ChangeKind::DerivedTransformRefChanged,
        ChangeKind::DerivedTransformParamsChanged,
        ChangeKind::DerivedTypeChanged,
        ChangeKind::ConstraintAdded,
        ChangeKind::ConstraintRemoved,
        ChangeKind::ConstraintRenamed,
        ChangeKind::ConstraintInputsChanged,
        ChangeKind::ConstraintExpressionChanged,
        ChangeKind::TransformAdded,
        ChangeKind::TransformRemoved,
        ChangeKind::TransformImplChanged,
    ];
    for kind in all {
        let value = serde_json::to_value(kind).unwrap();
        assert_eq!(value, kind.as_str());
    }
}
