//! Sealed trace nodes.
//!
//! These are the immutable values produced by [`TraceTree::seal`]; the
//! mutable, lock-protected form lives in the builder.
//!
//! [`TraceTree::seal`]: super::builder::TraceTree::seal

use serde::Serialize;
use serde_json::Value;

use super::path::{PathSegment, ResponsePath};

/// An error raised while resolving a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub message: String,
    pub path: ResponsePath,
    /// Full JSON rendering of the error, when the engine supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl FieldError {
    pub fn new(message: impl Into<String>, path: ResponsePath) -> Self {
        Self {
            message: message.into(),
            path,
            json: None,
        }
    }

    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }
}

/// One node of a sealed trace.
///
/// Offsets are nanoseconds relative to the start of the trace. A node whose
/// resolution never reported completion (abnormal termination) keeps
/// `end_offset_ns == None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceNode {
    /// `None` only for the root.
    pub segment: Option<PathSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<String>,
    pub start_offset_ns: u64,
    pub end_offset_ns: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TraceNode>,
    /// Created on the way down to a descendant, never begun itself.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub implicit: bool,
}

impl TraceNode {
    pub fn is_root(&self) -> bool {
        self.segment.is_none()
    }

    /// Field name for field nodes.
    pub fn response_name(&self) -> Option<&str> {
        match &self.segment {
            Some(PathSegment::Field(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn duration_ns(&self) -> Option<u64> {
        self.end_offset_ns
            .map(|end| end.saturating_sub(self.start_offset_ns))
    }

    /// Number of begun field nodes below (and including) this node.
    ///
    /// Only fields that had their own `begin_field` count; index nodes and
    /// the root are structural.
    pub fn field_count(&self) -> usize {
        let own = usize::from(
            !self.implicit && matches!(self.segment, Some(PathSegment::Field(_))),
        );
        own + self.children.iter().map(TraceNode::field_count).sum::<usize>()
    }

    /// Total number of errors recorded anywhere in this subtree.
    pub fn error_count(&self) -> usize {
        self.errors.len() + self.children.iter().map(TraceNode::error_count).sum::<usize>()
    }

    pub fn child(&self, segment: &PathSegment) -> Option<&TraceNode> {
        self.children
            .iter()
            .find(|c| c.segment.as_ref() == Some(segment))
    }

    /// Walk down from this node following `path`.
    pub fn find(&self, path: &ResponsePath) -> Option<&TraceNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }
}
