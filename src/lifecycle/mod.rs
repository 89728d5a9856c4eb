//! Request lifecycle.
//!
//! Ties the reporting gate, the trace tree and the redaction engine together
//! for one operation, and hands finished traces to the reporting sink.

pub mod config;
pub mod context;
pub mod reporter;
pub mod sink;

pub use config::*;
pub use context::*;
pub use reporter::*;
pub use sink::*;
