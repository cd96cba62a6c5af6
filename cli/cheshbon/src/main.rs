//! Cheshbon CLI — deterministic, execution-free impact analysis for
//! versioned mapping specifications.
//!
//! Exit codes: 0 = no impact, 1 = impact found, 2 = validation failed.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cheshbon",
    version,
    about = "Which derived outputs does a spec change impact, and why?"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff two spec versions and report structural impact
    Diff {
        /// Path to the from-spec JSON
        from_spec: PathBuf,
        /// Path to the to-spec JSON
        to_spec: PathBuf,
        /// From-registry JSON (requires --to-registry)
        #[arg(long)]
        from_registry: Option<PathBuf>,
        /// To-registry JSON (requires --from-registry)
        #[arg(long)]
        to_registry: Option<PathBuf>,
        /// Bindings JSON, evaluated against the to-spec
        #[arg(long)]
        bindings: Option<PathBuf>,
        /// Raw schema JSON for binding validity checks
        #[arg(long)]
        raw_schema: Option<PathBuf>,
        /// Detail level (core, full)
        #[arg(long, default_value = "full")]
        detail: String,
        /// Also write an all-details report to this path
        #[arg(long)]
        all_details_out: Option<PathBuf>,
    },
    /// Verify artifacts or an all-details report
    Verify {
        #[command(subcommand)]
        target: VerifyTarget,
    },
}

#[derive(Subcommand)]
enum VerifyTarget {
    /// Re-derive an all-details report from its input artifacts
    Report {
        /// Path to the all-details report JSON
        report: PathBuf,
        /// Path to the from-spec JSON
        from_spec: PathBuf,
        /// Path to the to-spec JSON
        to_spec: PathBuf,
        /// From-registry JSON, when the report was built with registries
        #[arg(long)]
        from_registry: Option<PathBuf>,
        /// To-registry JSON, when the report was built with registries
        #[arg(long)]
        to_registry: Option<PathBuf>,
        /// Bindings JSON, when the report was built with bindings
        #[arg(long)]
        bindings: Option<PathBuf>,
        /// Raw schema JSON, when the report was built with one
        #[arg(long)]
        raw_schema: Option<PathBuf>,
    },
    /// Validate a mapping spec
    Spec {
        /// Path to the spec JSON
        spec: PathBuf,
        /// Transform registry JSON for reference checks
        #[arg(long)]
        registry: Option<PathBuf>,
        /// Bindings JSON for binding checks
        #[arg(long)]
        bindings: Option<PathBuf>,
        /// Raw schema JSON for binding validity checks
        #[arg(long)]
        raw_schema: Option<PathBuf>,
    },
    /// Validate a transform registry
    Registry {
        /// Path to the registry JSON
        registry: PathBuf,
    },
    /// Validate bindings, optionally against a spec and raw schema
    Bindings {
        /// Path to the bindings JSON
        bindings: PathBuf,
        /// Spec JSON to check required sources against
        #[arg(long)]
        spec: Option<PathBuf>,
        /// Raw schema JSON to check raw columns against
        #[arg(long)]
        raw_schema: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(2);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Diff {
            from_spec,
            to_spec,
            from_registry,
            to_registry,
            bindings,
            raw_schema,
            detail,
            all_details_out,
        } => commands::diff::run(
            &from_spec,
            &to_spec,
            from_registry.as_deref(),
            to_registry.as_deref(),
            bindings.as_deref(),
            raw_schema.as_deref(),
            &detail,
            all_details_out.as_deref(),
        ),

        Commands::Verify { target } => match target {
            VerifyTarget::Report {
                report,
                from_spec,
                to_spec,
                from_registry,
                to_registry,
                bindings,
                raw_schema,
            } => commands::verify::report(
                &report,
                &from_spec,
                &to_spec,
                from_registry.as_deref(),
                to_registry.as_deref(),
                bindings.as_deref(),
                raw_schema.as_deref(),
            ),
            VerifyTarget::Spec {
                spec,
                registry,
                bindings,
                raw_schema,
            } => commands::verify::spec(
                &spec,
                registry.as_deref(),
                bindings.as_deref(),
                raw_schema.as_deref(),
            ),
            VerifyTarget::Registry { registry } => commands::verify::registry(&registry),
            VerifyTarget::Bindings {
                bindings,
                spec,
                raw_schema,
            } => commands::verify::bindings(&bindings, spec.as_deref(), raw_schema.as_deref()),
        },
    }
}
