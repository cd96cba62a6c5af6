//! The `cheshbon diff` subcommand: structural impact analysis between two
//! spec versions.

use std::path::Path;

use cheshbon_diff::{diff, DetailLevel};
use cheshbon_verify::{build_report, ReportInputs, ReportMode};

use super::{load_bindings, load_raw_schema, load_registry, load_spec, print_canonical};

#[allow(clippy::too_many_arguments)]
pub fn run(
    from_spec: &Path,
    to_spec: &Path,
    from_registry: Option<&Path>,
    to_registry: Option<&Path>,
    bindings: Option<&Path>,
    raw_schema: Option<&Path>,
    detail: &str,
    all_details_out: Option<&Path>,
) -> anyhow::Result<i32> {
    let detail = match detail {
        "core" => DetailLevel::Core,
        "full" => DetailLevel::Full,
        other => anyhow::bail!("unknown detail level '{other}' (expected core or full)"),
    };

    let spec_v1 = load_spec(from_spec)?;
    let spec_v2 = load_spec(to_spec)?;

    let registries = match (from_registry, to_registry) {
        (Some(from), Some(to)) => Some((load_registry(from)?, load_registry(to)?)),
        (None, None) => None,
        _ => anyhow::bail!(
            "--from-registry and --to-registry must be provided together, or neither"
        ),
    };
    let bindings = bindings.map(load_bindings).transpose()?;
    let raw_schema = raw_schema.map(load_raw_schema).transpose()?;

    // The all-details report needs paths regardless of the printed detail.
    let compute_detail = if all_details_out.is_some() {
        DetailLevel::Full
    } else {
        detail
    };

    let result = diff(
        &spec_v1,
        &spec_v2,
        registries.as_ref().map(|(v1, v2)| (v1, v2)),
        bindings.as_ref(),
        raw_schema.as_ref(),
        compute_detail,
    );

    let mut printed = result.clone();
    if detail == DetailLevel::Core {
        printed.paths.clear();
        printed.alt_path_counts.clear();
    }
    print_canonical(&serde_json::to_value(&printed)?)?;

    if let Some(out) = all_details_out {
        let inputs = ReportInputs {
            from_spec: &spec_v1,
            to_spec: &spec_v2,
            registry_v1: registries.as_ref().map(|(v1, _)| v1),
            registry_v2: registries.as_ref().map(|(_, v2)| v2),
            bindings: bindings.as_ref(),
            raw_schema: raw_schema.as_ref(),
        };
        let report = build_report(ReportMode::AllDetails, &result, &inputs)?;
        let body = cheshbon_core::canonical::canonical_json(&report)?;
        std::fs::write(out, body + "\n")?;
    }

    Ok(result.exit_code())
}
