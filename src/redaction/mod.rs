//! Redaction policy engine.
//!
//! Pure functions deciding which request variables, headers and field errors
//! reach a trace. Failures inside the engine always degrade to disclosing
//! less, never to an error returned to the request.

pub mod errors;
pub mod headers;
pub mod policy;
pub mod variables;

pub use errors::*;
pub use headers::*;
pub use policy::*;
pub use variables::*;
