//! # cheshbon-core
//!
//! Data substrate for the Cheshbon impact analyzer: canonical JSON and
//! hashing, the typed mapping-spec model, the transform registry, the
//! binding layer, and the dependency graph.
//!
//! ## Determinism Guarantees
//!
//! - Canonical JSON is byte-stable: sorted keys, NFC strings, no floats
//! - Every map/set that crosses an API boundary is ordered (`BTreeMap` /
//!   `BTreeSet`); native iteration order never leaks
//! - All entities are immutable value objects; transform history is the one
//!   append-only structure
//!
//! The crate performs no file, clock, or network access.

pub mod bindings;
pub mod canonical;
pub mod error;
pub mod graph;
pub mod registry;
pub mod spec;

pub use bindings::{
    ambiguous_bindings, binding_status, invalid_bindings, missing_source_bindings,
    required_source_ids, BindingIssue, BindingStatus, Bindings, RawColumn, RawSchema,
};
pub use canonical::{
    canonical_json, canonical_json_set_array, canonical_len, digest_value, hash_params,
    parse_json_bytes, sha256_hex, MAX_DEPTH,
};
pub use error::{
    BindingError, CanonicalizationError, GraphError, RegistryValidationError, SpecValidationError,
};
pub use graph::{DependencyGraph, ALT_PATH_SLACK, MAX_ALT_PATHS};
pub use registry::{
    ImplFingerprint, Signature, TransformEntry, TransformHistoryEntry, TransformRegistry,
};
pub use spec::{
    Constraint, DerivedVariable, MappingSpec, SourceColumn, PARAMS_HARD_LIMIT, PARAMS_WARN_LIMIT,
};

/// Artifact schema version understood by this kernel.
pub const SPEC_SCHEMA_VERSION: &str = "0.7";
