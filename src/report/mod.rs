//! Report model.
//!
//! The sealed `Trace` value and the helpers that key it for the sink.

pub mod models;
pub mod signature;

pub use models::*;
pub use signature::*;
