//! Structured logging with request context.
//!
//! Every log line emitted by the capture layer carries the request id and,
//! once known, the operation name so lines from concurrent requests can be
//! told apart.

pub mod structured;

pub use structured::*;
