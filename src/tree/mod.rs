//! Execution trace tree.
//!
//! A path-addressed tree mirroring one operation's result shape, written
//! concurrently by sibling field resolutions and sealed once at request end.

pub mod builder;
pub mod node;
pub mod path;

pub use builder::*;
pub use node::*;
pub use path::*;
