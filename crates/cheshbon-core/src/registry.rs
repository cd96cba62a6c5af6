//! Transform registry: versioned transform entries with structured
//! implementation fingerprints and append-only history.
//!
//! The digest inside [`ImplFingerprint`] is authoritative for change
//! detection; `version`, `source`, and `ref` are informational. History is
//! the one append-only structure in the system: snapshots are immutable and
//! appending returns a new entry, never mutating an existing one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistryValidationError;

/// Transform signature: input types and a single output type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Input type strings, positional.
    pub inputs: Vec<String>,
    /// Output type string.
    pub output: String,
}

/// Structured fingerprint of a transform implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplFingerprint {
    /// Digest algorithm; always `sha256`.
    pub algo: String,
    /// Where the implementation lives (builtin, file, git, ...).
    pub source: String,
    /// Relative path or reference to the implementation. Never absolute.
    #[serde(rename = "ref")]
    pub reference: String,
    /// SHA-256 of the implementation, 64 lowercase hex chars, unprefixed.
    pub digest: String,
}

/// Immutable snapshot of a transform's state at a point in time.
///
/// Timestamps are caller-supplied opaque strings; the kernel never reads a
/// clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformHistoryEntry {
    /// Caller-supplied timestamp for the snapshot.
    pub timestamp: String,
    /// Fingerprint at snapshot time.
    pub impl_fingerprint: ImplFingerprint,
    /// Params schema digest at snapshot time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_schema_hash: Option<String>,
    /// Optional reason recorded with the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
}

/// A transform registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformEntry {
    /// Stable identifier, `t:`-prefixed lowercase. Matching is
    /// case-sensitive.
    pub id: String,
    /// Semver-ish version string, informational only.
    pub version: String,
    /// Transform kind, opaque to the kernel.
    pub kind: String,
    /// Input/output signature.
    pub signature: Signature,
    /// Digest of the JSON schema governing params, `sha256:`-prefixed, or
    /// absent for no-params transforms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_schema_hash: Option<String>,
    /// Current implementation fingerprint. Diffing reads only this.
    pub impl_fingerprint: ImplFingerprint,
    /// Append-only history of snapshots, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<TransformHistoryEntry>,
}

impl TransformEntry {
    /// Append a snapshot of the current state, returning a new entry.
    ///
    /// The receiver is unchanged; prior history entries are carried over
    /// byte-identically.
    pub fn with_history_entry(
        &self,
        timestamp: impl Into<String>,
        change_reason: Option<String>,
    ) -> TransformEntry {
        let mut next = self.clone();
        next.history.push(TransformHistoryEntry {
            timestamp: timestamp.into(),
            impl_fingerprint: self.impl_fingerprint.clone(),
            params_schema_hash: self.params_schema_hash.clone(),
            change_reason,
        });
        next
    }
}

/// A transform registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRegistry {
    /// Artifact schema version tag.
    pub registry_version: String,
    /// Registered transforms.
    pub transforms: Vec<TransformEntry>,
}

impl TransformRegistry {
    /// Parse and validate a registry from a JSON value.
    pub fn from_value(value: &Value) -> Result<Self, RegistryValidationError> {
        let registry: TransformRegistry = serde_json::from_value(value.clone())
            .map_err(|e| RegistryValidationError::InvalidStructure(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<(), RegistryValidationError> {
        let mut seen = std::collections::BTreeSet::new();
        for transform in &self.transforms {
            validate_transform_id(&transform.id)?;
            if !seen.insert(transform.id.clone()) {
                return Err(RegistryValidationError::DuplicateTransformId(
                    transform.id.clone(),
                ));
            }
            validate_fingerprint(&transform.id, &transform.impl_fingerprint)?;
            for entry in &transform.history {
                validate_fingerprint(&transform.id, &entry.impl_fingerprint)?;
            }
            if let Some(hash) = &transform.params_schema_hash {
                validate_schema_hash(&transform.id, hash)?;
            }
        }
        Ok(())
    }

    /// Look up a transform by reference. Matching is case-sensitive.
    pub fn get(&self, transform_ref: &str) -> Option<&TransformEntry> {
        self.transforms.iter().find(|t| t.id == transform_ref)
    }

    /// Whether a transform reference resolves in this registry.
    pub fn contains(&self, transform_ref: &str) -> bool {
        self.get(transform_ref).is_some()
    }

    /// All transform IDs, in declaration order.
    pub fn transform_ids(&self) -> Vec<String> {
        self.transforms.iter().map(|t| t.id.clone()).collect()
    }
}

fn validate_transform_id(id: &str) -> Result<(), RegistryValidationError> {
    if !id.starts_with("t:") || id.len() <= 2 {
        return Err(RegistryValidationError::InvalidTransformId {
            id: id.to_string(),
            detail: "expected 't:' prefix followed by a name".into(),
        });
    }
    if id != id.to_lowercase() {
        return Err(RegistryValidationError::InvalidTransformId {
            id: id.to_string(),
            detail: "must be lowercase, e.g. 't:ct_map'".into(),
        });
    }
    Ok(())
}

fn validate_fingerprint(
    id: &str,
    fingerprint: &ImplFingerprint,
) -> Result<(), RegistryValidationError> {
    if fingerprint.algo != "sha256" {
        return Err(RegistryValidationError::InvalidDigest {
            id: id.to_string(),
            detail: format!("unsupported algo '{}'", fingerprint.algo),
        });
    }
    let digest = &fingerprint.digest;
    if digest.len() != 64
        || !digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(RegistryValidationError::InvalidDigest {
            id: id.to_string(),
            detail: format!("digest must be 64 lowercase hex chars, got '{digest}'"),
        });
    }
    if is_absolute_ref(&fingerprint.reference) {
        return Err(RegistryValidationError::AbsoluteImplRef(
            fingerprint.reference.clone(),
        ));
    }
    Ok(())
}

fn validate_schema_hash(id: &str, hash: &str) -> Result<(), RegistryValidationError> {
    if !hash.starts_with("sha256:") || hash.len() != 71 {
        return Err(RegistryValidationError::InvalidDigest {
            id: id.to_string(),
            detail: format!("params_schema_hash must be 'sha256:' + 64 hex chars, got '{hash}'"),
        });
    }
    Ok(())
}

fn is_absolute_ref(reference: &str) -> bool {
    reference.starts_with('/')
        || reference.starts_with('\\')
        || reference.contains("://")
        || (reference.len() >= 3
            && reference.as_bytes()[0].is_ascii_alphabetic()
            && &reference[1..2] == ":"
            && (reference.as_bytes()[2] == b'/' || reference.as_bytes()[2] == b'\\'))
}
