//! Process-wide reporting configuration.
//!
//! Built once at startup and shared read-only with every request through an
//! `Arc`. Declarative settings can come from JSON; callbacks are attached on
//! the builder.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::log_warn;
use crate::redaction::errors::{ErrorDescriptor, ErrorPolicy};
use crate::redaction::policy::{PolicyDescriptor, RedactionPolicy};
use crate::report::models::ClientInfo;
use crate::report::signature::schema_hash;

use super::context::RequestContext;

/// Decides, before any capture work, whether an operation is traced.
pub type ShouldReportFn = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Derives the client identity recorded on a trace.
pub type ClientInfoFn = Arc<dyn Fn(&RequestContext) -> ClientInfo + Send + Sync>;

pub struct ReportingConfig {
    should_report_query: Option<ShouldReportFn>,
    send_variable_values: RedactionPolicy,
    send_headers: RedactionPolicy,
    send_errors: ErrorPolicy,
    client_info: Option<ClientInfoFn>,
    schema_hash: String,
}

impl ReportingConfig {
    pub fn builder() -> ReportingConfigBuilder {
        ReportingConfigBuilder::default()
    }

    pub fn send_variable_values(&self) -> &RedactionPolicy {
        &self.send_variable_values
    }

    pub fn send_headers(&self) -> &RedactionPolicy {
        &self.send_headers
    }

    pub fn send_errors(&self) -> &ErrorPolicy {
        &self.send_errors
    }

    pub fn schema_hash(&self) -> &str {
        &self.schema_hash
    }

    /// Evaluate the reporting gate. Unset means report everything; a
    /// panicking predicate means do not report.
    pub fn should_report(&self, request: &RequestContext) -> bool {
        let Some(predicate) = &self.should_report_query else {
            return true;
        };

        match catch_unwind(AssertUnwindSafe(|| predicate(request))) {
            Ok(decision) => decision,
            Err(_) => {
                log_warn!(request.log_context(), "REPORT_PREDICATE_PANICKED", treated_as = "false");
                false
            }
        }
    }

    /// Client identity for a trace. A panicking callback falls back to the
    /// identity the request itself carries.
    pub fn client_info(&self, request: &RequestContext) -> ClientInfo {
        let Some(f) = &self.client_info else {
            return request.default_client_info();
        };

        match catch_unwind(AssertUnwindSafe(|| f(request))) {
            Ok(info) => info,
            Err(_) => {
                log_warn!(request.log_context(), "CLIENT_INFO_PANICKED", treated_as = "default");
                request.default_client_info()
            }
        }
    }
}

impl fmt::Debug for ReportingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingConfig")
            .field("should_report_query", &self.should_report_query.is_some())
            .field("send_variable_values", &self.send_variable_values)
            .field("send_headers", &self.send_headers)
            .field("send_errors", &self.send_errors)
            .field("client_info", &self.client_info.is_some())
            .field("schema_hash", &self.schema_hash)
            .finish()
    }
}

/// JSON form of the declarative settings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    send_variable_values: Option<PolicyDescriptor>,
    #[serde(default)]
    send_headers: Option<PolicyDescriptor>,
    #[serde(default)]
    send_errors: Option<ErrorDescriptor>,
    #[serde(default)]
    schema_hash: Option<String>,
    #[serde(default)]
    schema_sdl: Option<String>,
}

#[derive(Default)]
pub struct ReportingConfigBuilder {
    should_report_query: Option<ShouldReportFn>,
    send_variable_values: RedactionPolicy,
    send_headers: RedactionPolicy,
    send_errors: ErrorPolicy,
    client_info: Option<ClientInfoFn>,
    schema_hash: Option<String>,
}

impl ReportingConfigBuilder {
    /// Start from a JSON document such as
    /// `{"sendVariableValues": {"exceptNames": ["password"]}, "schemaSdl": "..."}`.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: ConfigFile =
            serde_json::from_str(json).context("invalid reporting configuration")?;

        let mut builder = Self {
            send_variable_values: RedactionPolicy::from_descriptor(
                file.send_variable_values.as_ref(),
            ),
            send_headers: RedactionPolicy::from_descriptor(file.send_headers.as_ref()),
            send_errors: file
                .send_errors
                .map(|d| d.to_policy())
                .unwrap_or_default(),
            ..Self::default()
        };

        builder.schema_hash = match (file.schema_hash, file.schema_sdl) {
            (Some(_), Some(_)) => {
                anyhow::bail!("set only one of schemaHash and schemaSdl")
            }
            (Some(hash), None) => Some(hash),
            (None, Some(sdl)) => Some(schema_hash(&sdl)),
            (None, None) => None,
        };

        Ok(builder)
    }

    pub fn should_report_query<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.should_report_query = Some(Arc::new(f));
        self
    }

    pub fn send_variable_values(mut self, policy: RedactionPolicy) -> Self {
        self.send_variable_values = policy;
        self
    }

    pub fn send_headers(mut self, policy: RedactionPolicy) -> Self {
        self.send_headers = policy;
        self
    }

    pub fn send_errors(mut self, policy: ErrorPolicy) -> Self {
        self.send_errors = policy;
        self
    }

    pub fn client_info<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> ClientInfo + Send + Sync + 'static,
    {
        self.client_info = Some(Arc::new(f));
        self
    }

    /// Use a precomputed schema identity.
    pub fn schema_hash(mut self, hash: &str) -> Self {
        self.schema_hash = Some(hash.to_string());
        self
    }

    /// Derive the schema identity from the schema document.
    pub fn schema_sdl(mut self, sdl: &str) -> Self {
        self.schema_hash = Some(schema_hash(sdl));
        self
    }

    pub fn build(self) -> anyhow::Result<ReportingConfig> {
        let schema_hash = self
            .schema_hash
            .filter(|h| !h.is_empty())
            .context("schema identity is required (schema_hash or schema_sdl)")?;

        log::info!(
            "REPORTING_CONFIG_BUILT variables={} headers={} errors={:?} gate={}",
            self.send_variable_values.kind(),
            self.send_headers.kind(),
            self.send_errors,
            self.should_report_query.is_some()
        );

        Ok(ReportingConfig {
            should_report_query: self.should_report_query,
            send_variable_values: self.send_variable_values,
            send_headers: self.send_headers,
            send_errors: self.send_errors,
            client_info: self.client_info,
            schema_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReportingConfig::builder().schema_hash("abc").build().unwrap();
        assert!(matches!(config.send_variable_values(), RedactionPolicy::Default));
        assert!(matches!(config.send_headers(), RedactionPolicy::Default));
        assert!(matches!(config.send_errors(), ErrorPolicy::Masked));
        assert!(config.should_report(&RequestContext::new(None)));
    }

    #[test]
    fn test_schema_identity_required() {
        assert!(ReportingConfig::builder().build().is_err());
    }

    #[test]
    fn test_from_json() {
        let config = ReportingConfigBuilder::from_json(
            r#"{
                "sendVariableValues": {"exceptNames": ["password"]},
                "sendHeaders": {"all": false},
                "sendErrors": {"unmodified": true},
                "schemaSdl": "type Query { a: Int }"
            }"#,
        )
        .unwrap()
        .build()
        .unwrap();

        assert!(matches!(config.send_variable_values(), RedactionPolicy::Except(_)));
        assert!(matches!(config.send_headers(), RedactionPolicy::All));
        assert!(matches!(config.send_errors(), ErrorPolicy::Unmodified));
        assert_eq!(config.schema_hash(), schema_hash("type Query { a: Int }"));
    }

    #[test]
    fn test_from_json_rejects_unknown_and_conflicting_keys() {
        assert!(ReportingConfigBuilder::from_json(r#"{"sendVariables": {}}"#).is_err());
        assert!(ReportingConfigBuilder::from_json(
            r#"{"schemaHash": "a", "schemaSdl": "type Query { a: Int }"}"#
        )
        .is_err());
    }

    #[test]
    fn test_panicking_gate_is_treated_as_false() {
        let config = ReportingConfig::builder()
            .schema_hash("abc")
            .should_report_query(|_| panic!("gate bug"))
            .build()
            .unwrap();

        assert!(!config.should_report(&RequestContext::new(None)));
    }

    #[test]
    fn test_panicking_client_info_falls_back_to_request_headers() {
        let config = ReportingConfig::builder()
            .schema_hash("abc")
            .client_info(|_| panic!("client info bug"))
            .build()
            .unwrap();

        let request = RequestContext::new(None)
            .with_header("x-client-name", "ios")
            .with_header("x-client-version", "2.1");
        let info = config.client_info(&request);

        assert_eq!(info.client_name.as_deref(), Some("ios"));
        assert_eq!(info.client_version.as_deref(), Some("2.1"));
    }
}
