//! Reporting sink collaborator.

use crate::report::models::Trace;

/// Receives finished traces. Transport, batching and retry are the
/// implementor's concern.
pub trait ReportingSink: Send + Sync {
    /// Called once per captured operation, after the trace is sealed and
    /// redacted.
    fn add_trace(&self, report_key: &str, schema_hash: &str, trace: Trace) -> anyhow::Result<()>;
}
