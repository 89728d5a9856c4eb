//! Structured logging utilities.
//!
//! Provides context-aware logging with request_id and operation name
//! included in every log message, followed by an UPPER_SNAKE event token and
//! `key=value` pairs.

use std::fmt;

/// Initialize the process-wide logger.
///
/// For binaries and tests. The library never calls this itself; a host
/// that installs its own `log` backend keeps it. Safe to call repeatedly;
/// only the first call installs the backend.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .try_init();
}

/// Logging context for one in-flight request.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub request_id: String,
    pub operation: Option<String>,
}

impl LogContext {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            operation: None,
        }
    }

    pub fn with_operation(&self, operation: &str) -> Self {
        Self {
            request_id: self.request_id.clone(),
            operation: Some(operation.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(op) => write!(f, "[request={}] [op={}]", self.request_id, op),
            None => write!(f, "[request={}]", self.request_id),
        }
    }
}

/// Log an info event with context: `log_info!(ctx, "EVENT", key = value)`.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:literal $(, $key:ident = $value:expr)* $(,)?) => {
        log::info!(
            concat!("{} ", $event $(, " ", stringify!($key), "={}")*),
            $ctx $(, $value)*
        )
    };
}

/// Log a warning event with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:literal $(, $key:ident = $value:expr)* $(,)?) => {
        log::warn!(
            concat!("{} ", $event $(, " ", stringify!($key), "={}")*),
            $ctx $(, $value)*
        )
    };
}

/// Log an error event with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:literal $(, $key:ident = $value:expr)* $(,)?) => {
        log::error!(
            concat!("{} ", $event $(, " ", stringify!($key), "={}")*),
            $ctx $(, $value)*
        )
    };
}

/// Log a debug event with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:literal $(, $key:ident = $value:expr)* $(,)?) => {
        log::debug!(
            concat!("{} ", $event $(, " ", stringify!($key), "={}")*),
            $ctx $(, $value)*
        )
    };
}
