//! CLI subcommands. All file I/O lives here; the kernel crates only ever
//! see in-memory values.

pub mod diff;
pub mod verify;

use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use cheshbon_core::bindings::{Bindings, RawSchema};
use cheshbon_core::canonical::parse_json_bytes;
use cheshbon_core::registry::TransformRegistry;
use cheshbon_core::spec::MappingSpec;

pub(crate) fn load_value(path: &Path) -> anyhow::Result<Value> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_json_bytes(&bytes).with_context(|| format!("parsing {}", path.display()))
}

pub(crate) fn load_spec(path: &Path) -> anyhow::Result<MappingSpec> {
    let value = load_value(path)?;
    MappingSpec::from_value(&value).with_context(|| format!("validating spec {}", path.display()))
}

pub(crate) fn load_registry(path: &Path) -> anyhow::Result<TransformRegistry> {
    let value = load_value(path)?;
    TransformRegistry::from_value(&value)
        .with_context(|| format!("validating registry {}", path.display()))
}

pub(crate) fn load_bindings(path: &Path) -> anyhow::Result<Bindings> {
    let value = load_value(path)?;
    serde_json::from_value(value).with_context(|| format!("parsing bindings {}", path.display()))
}

pub(crate) fn load_raw_schema(path: &Path) -> anyhow::Result<RawSchema> {
    let value = load_value(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("parsing raw schema {}", path.display()))
}

/// Print a value as canonical JSON on stdout.
pub(crate) fn print_canonical(value: &Value) -> anyhow::Result<()> {
    println!("{}", cheshbon_core::canonical::canonical_json(value)?);
    Ok(())
}
