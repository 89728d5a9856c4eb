//! Finished trace records handed to the reporting sink.
//!
//! These are in-memory values. `Serialize` is derived for sinks that want a
//! JSON rendering; it is not a wire format.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::redaction::headers::RedactedHeaderMap;
use crate::redaction::variables::RedactedVariableMap;
use crate::tree::node::TraceNode;

/// Redacted request payload attached to a trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraceDetails {
    /// Every original variable name, mapped to its JSON or `""`.
    pub variables_json: RedactedVariableMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// Transport metadata attached to a trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub request_headers: RedactedHeaderMap,
}

/// Identity of the calling client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub client_name: Option<String>,
    pub client_version: Option<String>,
}

/// One captured operation, sealed and redacted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub trace_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ns: u64,
    pub root: TraceNode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    pub schema_hash: String,

    pub details: TraceDetails,
    pub http: HttpMetadata,
}
