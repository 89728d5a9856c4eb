//! Variable redaction.
//!
//! Produces a map from every original variable name to either its JSON
//! rendering or the empty string. The output key set always equals the
//! input key set, whatever the policy does.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use serde_json::Value;

use super::policy::{RedactionPolicy, TransformInput, VariableMap};

/// Recorded (JSON-encoded) for a value that cannot be serialized.
pub const UNSERIALIZABLE_PLACEHOLDER: &str = "[Unable to convert value to JSON]";

/// Recorded (JSON-encoded) for every key when a custom transform fails.
pub const TRANSFORM_ERROR_PLACEHOLDER: &str = "[PREDICATE_FUNCTION_ERROR]";

/// Variable name -> JSON string, or `""` when redacted.
pub type RedactedVariableMap = BTreeMap<String, String>;

/// Redact `original` according to `policy`.
pub fn redact_variables<V: Serialize>(
    original: &BTreeMap<String, V>,
    policy: &RedactionPolicy,
) -> RedactedVariableMap {
    redact_variables_for_operation(original, policy, None)
}

/// Same as [`redact_variables`], also handing the operation text to a
/// custom transform.
pub fn redact_variables_for_operation<V: Serialize>(
    original: &BTreeMap<String, V>,
    policy: &RedactionPolicy,
    operation_string: Option<&str>,
) -> RedactedVariableMap {
    match policy {
        RedactionPolicy::Default | RedactionPolicy::None => blank(original),
        RedactionPolicy::All => original
            .iter()
            .map(|(name, value)| (name.clone(), serialize_or_placeholder(value)))
            .collect(),
        RedactionPolicy::Except(names) => original
            .iter()
            .map(|(name, value)| {
                let out = if names.contains(name) {
                    String::new()
                } else {
                    serialize_or_placeholder(value)
                };
                (name.clone(), out)
            })
            .collect(),
        RedactionPolicy::Only(names) => original
            .iter()
            .map(|(name, value)| {
                let out = if names.contains(name) {
                    serialize_or_placeholder(value)
                } else {
                    String::new()
                };
                (name.clone(), out)
            })
            .collect(),
        RedactionPolicy::Transform(transform) => {
            let variables = to_value_map(original);
            let input = TransformInput {
                variables: &variables,
                operation_string,
            };

            match catch_unwind(AssertUnwindSafe(|| transform(input))) {
                Ok(Ok(modified)) => keep_original_keys(original, &modified),
                Ok(Err(e)) => {
                    log::warn!(
                        "VARIABLE_TRANSFORM_FAILED error={} keys={}",
                        e,
                        original.len()
                    );
                    fill(original, TRANSFORM_ERROR_PLACEHOLDER)
                }
                Err(_) => {
                    log::warn!(
                        "VARIABLE_TRANSFORM_PANICKED keys={}",
                        original.len()
                    );
                    fill(original, TRANSFORM_ERROR_PLACEHOLDER)
                }
            }
        }
    }
}

fn blank<V>(original: &BTreeMap<String, V>) -> RedactedVariableMap {
    original
        .keys()
        .map(|name| (name.clone(), String::new()))
        .collect()
}

fn fill<V>(original: &BTreeMap<String, V>, placeholder: &str) -> RedactedVariableMap {
    let encoded = json_string(placeholder);
    original
        .keys()
        .map(|name| (name.clone(), encoded.clone()))
        .collect()
}

/// Project a transform's output back onto the original key set.
fn keep_original_keys<V>(
    original: &BTreeMap<String, V>,
    modified: &VariableMap,
) -> RedactedVariableMap {
    original
        .keys()
        .map(|name| {
            let out = match modified.get(name) {
                Some(value) => serialize_or_placeholder(value),
                None => String::new(),
            };
            (name.clone(), out)
        })
        .collect()
}

fn to_value_map<V: Serialize>(original: &BTreeMap<String, V>) -> VariableMap {
    original
        .iter()
        .map(|(name, value)| {
            let value = serde_json::to_value(value)
                .unwrap_or_else(|_| Value::String(UNSERIALIZABLE_PLACEHOLDER.to_string()));
            (name.clone(), value)
        })
        .collect()
}

fn serialize_or_placeholder<V: Serialize + ?Sized>(value: &V) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        log::debug!("VARIABLE_SERIALIZE_FAILED error={}", e);
        json_string(UNSERIALIZABLE_PLACEHOLDER)
    })
}

fn json_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}
