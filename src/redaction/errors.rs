//! Disclosure policy for field errors recorded in a trace.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Deserialize;

use crate::tree::node::FieldError;

/// Message recorded in place of a masked error.
pub const MASKED_ERROR_MESSAGE: &str = "<masked>";

/// Rewrites an error before it is attached; `None` drops it from the trace.
pub type ErrorTransformFn = Arc<dyn Fn(FieldError) -> Option<FieldError> + Send + Sync>;

#[derive(Clone, Default)]
pub enum ErrorPolicy {
    /// Replace the message and drop the JSON rendering, keep the path.
    #[default]
    Masked,
    Unmodified,
    Transform(ErrorTransformFn),
}

impl ErrorPolicy {
    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(FieldError) -> Option<FieldError> + Send + Sync + 'static,
    {
        ErrorPolicy::Transform(Arc::new(f))
    }

    /// Apply the policy. A panicking transform falls back to masking.
    pub fn apply(&self, error: FieldError) -> Option<FieldError> {
        match self {
            ErrorPolicy::Unmodified => Some(error),
            ErrorPolicy::Masked => Some(mask(error)),
            ErrorPolicy::Transform(f) => {
                let fallback = mask(error.clone());
                match catch_unwind(AssertUnwindSafe(|| f(error))) {
                    Ok(rewritten) => rewritten,
                    Err(_) => {
                        log::warn!(
                            "ERROR_TRANSFORM_PANICKED path={} treated_as=masked",
                            fallback.path
                        );
                        Some(fallback)
                    }
                }
            }
        }
    }
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Masked => f.write_str("Masked"),
            ErrorPolicy::Unmodified => f.write_str("Unmodified"),
            ErrorPolicy::Transform(_) => f.write_str("Transform(<fn>)"),
        }
    }
}

/// Configuration-file form: `{"masked": true}` or `{"unmodified": true}`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ErrorDescriptor {
    #[serde(default)]
    pub masked: Option<bool>,
    #[serde(default)]
    pub unmodified: Option<bool>,
}

impl ErrorDescriptor {
    /// Anything other than an explicit `unmodified: true` masks.
    pub fn to_policy(&self) -> ErrorPolicy {
        match (self.unmodified, self.masked) {
            (Some(true), Some(true)) => ErrorPolicy::Masked,
            (Some(true), _) => ErrorPolicy::Unmodified,
            _ => ErrorPolicy::Masked,
        }
    }
}

fn mask(error: FieldError) -> FieldError {
    FieldError {
        message: MASKED_ERROR_MESSAGE.to_string(),
        path: error.path,
        json: None,
    }
}
