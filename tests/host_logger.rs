//! The host application owns the process-wide logger.
//!
//! Kept in its own test binary: the logger can be installed once per process.

use std::sync::Arc;

use optrace_core::{ReportingConfig, ReportingSink, RequestContext, Trace, TraceReporter};

struct DiscardSink;

impl ReportingSink for DiscardSink {
    fn add_trace(&self, _: &str, _: &str, _: Trace) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn host_can_install_logger_after_reporter_is_used() {
    let config = ReportingConfig::builder().schema_hash("schema-1").build().unwrap();
    let reporter = TraceReporter::new(Arc::new(config), Arc::new(DiscardSink));
    reporter
        .request_did_start(Arc::new(RequestContext::new(Some("{ me }"))))
        .end();

    assert!(env_logger::builder().is_test(true).try_init().is_ok());
}
