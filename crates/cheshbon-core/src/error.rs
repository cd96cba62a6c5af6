//! Error types for the Cheshbon kernel.

use thiserror::Error;

/// Errors from canonical JSON serialization.
///
/// These are terminal: the caller must fix the input. There is no recovery
/// path inside the kernel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CanonicalizationError {
    /// A floating-point number was encountered. Decimals must be encoded as
    /// strings so that every platform hashes the same bytes.
    #[error("float not allowed at {path}: encode decimals as strings")]
    FloatForbidden {
        /// JSON path to the offending value.
        path: String,
    },

    /// The value cannot be represented as canonical JSON (unparseable input,
    /// a non-string object key, or nesting beyond the depth bound).
    #[error("non-JSON value: {detail}")]
    NonJsonType {
        /// Description of what was rejected.
        detail: String,
    },

    /// Input bytes were not valid UTF-8.
    #[error("input is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors from mapping-spec parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecValidationError {
    /// The spec document does not have the expected shape.
    #[error("failed to parse spec: {0}")]
    InvalidStructure(String),

    /// An identifier does not match its required typed prefix.
    #[error("invalid id format for '{id}': {detail}")]
    InvalidIdFormat {
        /// The offending identifier.
        id: String,
        /// What was wrong with it.
        detail: String,
    },

    /// The same identifier appears more than once across the spec.
    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    /// An input reference does not resolve to any declared element.
    #[error("unresolved reference '{reference}' in '{element_id}'")]
    UnresolvedReference {
        /// Element whose inputs contain the reference.
        element_id: String,
        /// The reference that did not resolve.
        reference: String,
    },

    /// Transform params exceed the hard canonical-size limit.
    #[error("params for '{id}' exceed the {limit}-byte limit ({actual} bytes canonical JSON)")]
    ParamsTooLarge {
        /// Derived variable carrying the params.
        id: String,
        /// The hard limit in bytes.
        limit: usize,
        /// Measured canonical size in bytes.
        actual: usize,
    },

    /// Transform params are not pure canonical JSON.
    #[error("params for '{id}' are not canonical JSON: {source}")]
    ParamsNotCanonical {
        /// Derived variable carrying the params.
        id: String,
        /// Underlying canonicalization failure.
        source: CanonicalizationError,
    },

    /// An implementation fingerprint carries an absolute path reference.
    #[error("impl_fingerprint.ref '{0}' must be a relative path")]
    AbsoluteImplRef(String),
}

/// Errors from transform-registry parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryValidationError {
    /// The registry document does not have the expected shape.
    #[error("failed to parse registry: {0}")]
    InvalidStructure(String),

    /// A transform ID appears more than once.
    #[error("duplicate transform id '{0}'")]
    DuplicateTransformId(String),

    /// A transform ID does not match the required `t:` lowercase form.
    #[error("invalid transform id '{id}': {detail}")]
    InvalidTransformId {
        /// The offending identifier.
        id: String,
        /// What was wrong with it.
        detail: String,
    },

    /// An implementation digest is not 64 lowercase hex characters.
    #[error("invalid impl digest for '{id}': {detail}")]
    InvalidDigest {
        /// Transform carrying the fingerprint.
        id: String,
        /// What was wrong with it.
        detail: String,
    },

    /// An implementation fingerprint carries an absolute path reference.
    #[error("impl_fingerprint.ref '{0}' must be a relative path")]
    AbsoluteImplRef(String),

    /// A derived variable references a transform the registry does not have.
    #[error("derived variable '{derived_id}' references missing transform '{transform_ref}'")]
    MissingTransformRef {
        /// The referencing derived variable.
        derived_id: String,
        /// The unresolved transform reference.
        transform_ref: String,
    },
}

/// Errors from dependency-graph analysis.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency graph contains a cycle.
    #[error("cycle detected in dependency graph: {}", nodes.join(" -> "))]
    CycleDetected {
        /// Participating node IDs, normalized to start at the
        /// lexicographically smallest member.
        nodes: Vec<String>,
    },
}

/// Errors from binding validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// More than one raw column is bound to the same source ID.
    #[error("ambiguous binding for '{source_id}': raw columns {}", raw_columns.join(", "))]
    AmbiguousBinding {
        /// The multiply-bound source ID.
        source_id: String,
        /// The raw columns bound to it, sorted.
        raw_columns: Vec<String>,
    },

    /// A binding references a raw column absent from the schema.
    #[error("binding for '{source_id}' references raw column '{raw_column}' not present in schema")]
    InvalidBinding {
        /// The bound source ID.
        source_id: String,
        /// The raw column missing from the schema.
        raw_column: String,
    },
}
