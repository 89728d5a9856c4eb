//! Request lifecycle orchestration.
//!
//! Coordinates one operation from start to handoff:
//! 1. Reporting gate (`should_report_query`)
//! 2. Trace tree creation and capture flag
//! 3. Field callbacks from the execution engine
//! 4. Seal at request end
//! 5. Variable and header redaction
//! 6. Handoff to the reporting sink
//!
//! The request is finalized by [`RequestGuard::end`] or, on any other exit
//! path including unwinding, by the guard's `Drop`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::{log_debug, log_error, log_info, log_warn};
use crate::logging::structured::LogContext;
use crate::redaction::headers::redact_headers;
use crate::redaction::variables::redact_variables_for_operation;
use crate::report::models::{HttpMetadata, Trace, TraceDetails};
use crate::report::signature::report_key;
use crate::tree::builder::{NodeHandle, TraceTree};
use crate::tree::node::FieldError;
use crate::tree::path::ResponsePath;

use super::config::ReportingConfig;
use super::context::RequestContext;
use super::sink::ReportingSink;

/// Observable state of a started request.
///
/// `Idle` and `Started` are transient inside
/// [`TraceReporter::request_did_start`] and never observed on a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Gated,
    Capturing,
    Ended,
}

enum Stage {
    Gated,
    Capturing(Arc<TraceTree>),
    Ended,
}

/// Entry point wiring requests to a sink under one configuration.
#[derive(Clone)]
pub struct TraceReporter {
    config: Arc<ReportingConfig>,
    sink: Arc<dyn ReportingSink>,
}

impl TraceReporter {
    pub fn new(config: Arc<ReportingConfig>, sink: Arc<dyn ReportingSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    /// Open a request. The returned guard finalizes it exactly once.
    pub fn request_did_start(&self, request: Arc<RequestContext>) -> RequestGuard {
        let ctx = request.log_context();

        let stage = if self.config.should_report(&request) {
            request.metrics.mark_capturing();
            log_debug!(ctx, "TRACE_CAPTURE_START");
            Stage::Capturing(Arc::new(TraceTree::new(
                ctx.clone(),
                self.config.send_errors().clone(),
            )))
        } else {
            log_debug!(ctx, "TRACE_GATED");
            Stage::Gated
        };

        RequestGuard {
            request,
            config: Arc::clone(&self.config),
            sink: Arc::clone(&self.sink),
            ctx,
            stage,
        }
    }
}

/// Scoped handle for one in-flight request.
#[must_use = "dropping the guard immediately ends the request"]
pub struct RequestGuard {
    request: Arc<RequestContext>,
    config: Arc<ReportingConfig>,
    sink: Arc<dyn ReportingSink>,
    ctx: LogContext,
    stage: Stage,
}

impl RequestGuard {
    pub fn state(&self) -> LifecycleState {
        match self.stage {
            Stage::Gated => LifecycleState::Gated,
            Stage::Capturing(_) => LifecycleState::Capturing,
            Stage::Ended => LifecycleState::Ended,
        }
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.stage, Stage::Capturing(_))
    }

    /// Callback target for the execution engine, `None` when gated.
    pub fn tracer(&self) -> Option<FieldTracer> {
        match &self.stage {
            Stage::Capturing(tree) => Some(FieldTracer {
                tree: Arc::clone(tree),
            }),
            _ => None,
        }
    }

    /// Finalize the request: seal, redact and report when capturing.
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        match std::mem::replace(&mut self.stage, Stage::Ended) {
            Stage::Capturing(tree) => self.report(&tree),
            Stage::Gated => log_debug!(self.ctx, "REQUEST_END", gated = true),
            Stage::Ended => {}
        }
    }

    fn report(&self, tree: &TraceTree) {
        let root = match tree.seal() {
            Ok(root) => root,
            Err(e) => {
                log_error!(self.ctx, "TRACE_SEAL_FAILED", error = e);
                return;
            }
        };

        let request = &self.request;

        let variables_json = redact_variables_for_operation(
            &request.variables,
            self.config.send_variable_values(),
            request.query.as_deref(),
        );

        let mut http = HttpMetadata {
            method: request.http_method.clone(),
            ..HttpMetadata::default()
        };
        redact_headers(&request.headers, self.config.send_headers(), &mut http);

        let client = self.config.client_info(request);
        let key = report_key(request.operation_name.as_deref(), request.query.as_deref());

        let trace = Trace {
            trace_id: Uuid::new_v4().to_string(),
            start_time: tree.start_time(),
            end_time: Utc::now(),
            duration_ns: root.end_offset_ns.unwrap_or_default(),
            client_name: client.client_name,
            client_version: client.client_version,
            schema_hash: self.config.schema_hash().to_string(),
            details: TraceDetails {
                variables_json,
                operation_name: request.operation_name.clone(),
            },
            http,
            root,
        };

        let fields = trace.root.field_count();
        let errors = trace.root.error_count();
        let duration_ns = trace.duration_ns;

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.sink
                .add_trace(&key, self.config.schema_hash(), trace)
        }));

        match outcome {
            Ok(Ok(())) => log_info!(
                self.ctx,
                "TRACE_REPORTED",
                fields = fields,
                errors = errors,
                duration_ns = duration_ns,
            ),
            Ok(Err(e)) => log_warn!(self.ctx, "TRACE_SINK_FAILED", error = format!("{:#}", e)),
            Err(_) => log_error!(self.ctx, "TRACE_SINK_PANICKED"),
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if matches!(self.stage, Stage::Ended) {
            return;
        }
        log_warn!(
            self.ctx,
            "REQUEST_END_IMPLICIT",
            panicking = std::thread::panicking(),
        );
        self.finish();
    }
}

/// Field-resolution callbacks for one capturing request.
///
/// Cheap to clone; hand one to each concurrent resolver.
#[derive(Debug, Clone)]
pub struct FieldTracer {
    tree: Arc<TraceTree>,
}

impl FieldTracer {
    /// Called when the engine starts resolving the field at `path`.
    pub fn will_resolve_field(
        &self,
        path: ResponsePath,
        type_name: &str,
        parent_type: Option<&str>,
    ) -> Result<FieldCompletion> {
        let handle = self.tree.begin_field(path, type_name, parent_type)?;
        Ok(FieldCompletion {
            tree: Arc::clone(&self.tree),
            handle,
        })
    }

    /// Record an error that belongs to the operation, not to one field.
    pub fn add_request_error(&self, error: FieldError) -> Result<()> {
        self.tree.add_root_error(error)
    }
}

/// Completion callback for one field, returned by
/// [`FieldTracer::will_resolve_field`].
#[derive(Debug)]
#[must_use = "call finish when the field resolves"]
pub struct FieldCompletion {
    tree: Arc<TraceTree>,
    handle: NodeHandle,
}

impl FieldCompletion {
    pub fn path(&self) -> &ResponsePath {
        self.handle.path()
    }

    pub fn finish(self, error: Option<FieldError>) -> Result<()> {
        self.tree.end_field(self.handle, error)
    }
}
