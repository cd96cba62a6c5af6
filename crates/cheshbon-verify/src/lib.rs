//! # cheshbon-verify
//!
//! Witnessed report construction and verification. Reports are deterministic
//! functions of a [`cheshbon_diff::DiffResult`] and the input artifacts; the
//! all-details mode carries input digests, per-node witnesses, and a content
//! hash, all of which [`verify_report`] re-derives from scratch.

pub mod report;
pub mod verifier;
pub mod witness;

pub use report::{
    build_report, content_hash, inputs_digest, ReportInputs, ReportMode, REPORT_SCHEMA_VERSION,
};
pub use verifier::{verify_report, VerifyError, VerifyOutcome};
pub use witness::{compute_witnesses, event_id, Witness};
