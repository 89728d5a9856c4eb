//! Error types for trace construction.
//!
//! Redaction never fails outward; these errors cover lifecycle misuse of the
//! trace tree, which indicates an integration bug rather than bad input.

use thiserror::Error;

use crate::tree::path::ResponsePath;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("trace is sealed; cannot {operation} at path {path}")]
    Sealed {
        operation: &'static str,
        path: ResponsePath,
    },

    #[error("trace was already sealed")]
    AlreadySealed,

    #[error("field at path {0} was already recorded")]
    DuplicatePath(ResponsePath),

    #[error("invalid response path {path}: {reason}")]
    InvalidPath {
        path: ResponsePath,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TraceError>;
