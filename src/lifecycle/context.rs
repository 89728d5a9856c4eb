//! Per-request input to the capture layer.
//!
//! Built by the execution engine for each operation and read, never
//! modified, by the lifecycle. The one exception is the capture flag on
//! [`RequestMetrics`], which the lifecycle sets when it starts tracing.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::logging::structured::LogContext;
use crate::redaction::headers::HeaderMultimap;
use crate::redaction::policy::VariableMap;
use crate::report::models::ClientInfo;

/// Header carrying the client name when the request has no `clientInfo`.
pub const CLIENT_NAME_HEADER: &str = "x-client-name";
/// Header carrying the client version when the request has no `clientInfo`.
pub const CLIENT_VERSION_HEADER: &str = "x-client-version";

/// Metrics record shared with the execution engine.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    captures_traces: AtomicBool,
}

impl RequestMetrics {
    pub fn captures_traces(&self) -> bool {
        self.captures_traces.load(Ordering::Acquire)
    }

    pub(crate) fn mark_capturing(&self) {
        self.captures_traces.store(true, Ordering::Release);
    }
}

/// One operation as seen by the capture layer.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub operation_name: Option<String>,
    pub query: Option<String>,
    pub variables: VariableMap,
    pub headers: HeaderMultimap,
    pub http_method: Option<String>,
    /// Free-form request extensions, e.g. `clientInfo`.
    pub extensions: Map<String, Value>,
    pub metrics: RequestMetrics,
}

impl RequestContext {
    pub fn new(query: Option<&str>) -> Self {
        Self {
            request_id: format!("req-{}", &Uuid::new_v4().to_string()[..8]),
            operation_name: None,
            query: query.map(|q| q.to_string()),
            variables: VariableMap::new(),
            headers: HeaderMultimap::new(),
            http_method: None,
            extensions: Map::new(),
            metrics: RequestMetrics::default(),
        }
    }

    pub fn with_operation_name(mut self, name: &str) -> Self {
        self.operation_name = Some(name.to_string());
        self
    }

    pub fn with_variables(mut self, variables: VariableMap) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn with_http_method(mut self, method: &str) -> Self {
        self.http_method = Some(method.to_string());
        self
    }

    pub fn with_extension(mut self, key: &str, value: Value) -> Self {
        self.extensions.insert(key.to_string(), value);
        self
    }

    pub fn log_context(&self) -> LogContext {
        let ctx = LogContext::new(&self.request_id);
        match &self.operation_name {
            Some(name) => ctx.with_operation(name),
            None => ctx,
        }
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(|v| v.as_str())
    }

    /// Client identity from the `clientInfo` extension, falling back to the
    /// client headers.
    pub fn default_client_info(&self) -> ClientInfo {
        let from_extension = |key: &str| {
            self.extensions
                .get("clientInfo")
                .and_then(|info| info.get(key))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };

        ClientInfo {
            client_name: from_extension("clientName")
                .or_else(|| self.header(CLIENT_NAME_HEADER).map(str::to_string)),
            client_version: from_extension("clientVersion")
                .or_else(|| self.header(CLIENT_VERSION_HEADER).map(str::to_string)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::new(None);
        let b = RequestContext::new(None);
        assert!(a.request_id.starts_with("req-"));
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_log_context_includes_operation() {
        let ctx = RequestContext::new(Some("{ a }")).with_operation_name("Q");
        let rendered = ctx.log_context().to_string();
        assert!(rendered.ends_with("[op=Q]"));
    }

    #[test]
    fn test_client_info_prefers_extension() {
        let ctx = RequestContext::new(None)
            .with_header("X-Client-Name", "header-client")
            .with_header("x-client-version", "2.0")
            .with_extension("clientInfo", json!({"clientName": "ext-client"}));

        let info = ctx.default_client_info();
        assert_eq!(info.client_name.as_deref(), Some("ext-client"));
        assert_eq!(info.client_version.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_metrics_flag() {
        let ctx = RequestContext::new(None);
        assert!(!ctx.metrics.captures_traces());
        ctx.metrics.mark_capturing();
        assert!(ctx.metrics.captures_traces());
    }
}
