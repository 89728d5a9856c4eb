//! optrace core - per-operation execution trace capture
//!
//! This crate builds a structured execution trace for each operation served
//! by a request-serving engine, redacts the request's sensitive payload, and
//! hands the finished trace to a reporting sink. The implementation
//! prioritizes:
//!
//! 1. **Privacy** - Nothing leaves the request without passing a policy;
//!    failures degrade to disclosing less
//! 2. **Logging** - Every decision point logged with request context
//! 3. **Concurrency** - Sibling fields record into one tree without a
//!    tree-wide lock
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `lifecycle` - Request orchestration, reporting gate, configuration
//! - `tree` - Concurrent, path-addressed trace tree
//! - `redaction` - Variable, header and error disclosure policies
//! - `report` - Finished trace model and report keys
//! - `logging` - Structured logging with request context
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use optrace_core::{
//!     response_path, RedactionPolicy, ReportingConfig, ReportingSink, RequestContext, Trace,
//!     TraceReporter,
//! };
//!
//! struct PrintSink;
//!
//! impl ReportingSink for PrintSink {
//!     fn add_trace(&self, key: &str, _schema: &str, trace: Trace) -> anyhow::Result<()> {
//!         println!("{} fields={}", key, trace.root.field_count());
//!         Ok(())
//!     }
//! }
//!
//! let config = ReportingConfig::builder()
//!     .schema_sdl("type Query { hello: String }")
//!     .send_variable_values(RedactionPolicy::All)
//!     .build()?;
//! let reporter = TraceReporter::new(Arc::new(config), Arc::new(PrintSink));
//!
//! let request = Arc::new(RequestContext::new(Some("{ hello }")));
//! let guard = reporter.request_did_start(request);
//! if let Some(tracer) = guard.tracer() {
//!     let field = tracer.will_resolve_field(response_path!["hello"], "String", Some("Query"))?;
//!     field.finish(None)?;
//! }
//! guard.end();
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod redaction;
pub mod report;
pub mod tree;

pub use error::{Result, TraceError};
pub use lifecycle::{
    FieldCompletion, FieldTracer, LifecycleState, ReportingConfig, ReportingConfigBuilder,
    ReportingSink, RequestContext, RequestGuard, TraceReporter,
};
pub use redaction::{
    redact_headers, redact_variables, ErrorPolicy, PolicyDescriptor, RedactedHeaderMap,
    RedactedVariableMap, RedactionPolicy, VariableMap,
};
pub use report::{ClientInfo, HttpMetadata, Trace, TraceDetails};
pub use tree::{FieldError, PathSegment, ResponsePath, TraceNode, TraceTree};
