//! Disclosure policies for request variables and headers.
//!
//! A [`RedactionPolicy`] is a closed set of cases; exactly one is active for
//! any call into the redaction engine. Operators usually write the loosely
//! shaped [`PolicyDescriptor`] in configuration, which is normalized into a
//! policy by [`RedactionPolicy::from_descriptor`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Raw operation variables as received from the client.
pub type VariableMap = BTreeMap<String, Value>;

/// Argument handed to a custom variable transform.
#[derive(Debug, Clone, Copy)]
pub struct TransformInput<'a> {
    pub variables: &'a VariableMap,
    pub operation_string: Option<&'a str>,
}

/// User-supplied rewrite of the variable map.
///
/// Keys missing from the returned map are redacted; keys it adds are ignored.
pub type VariableTransformFn =
    Arc<dyn Fn(TransformInput<'_>) -> anyhow::Result<VariableMap> + Send + Sync>;

#[derive(Clone, Default)]
pub enum RedactionPolicy {
    /// No policy configured: nothing is disclosed.
    #[default]
    Default,
    All,
    None,
    /// Blocklist: disclose everything except these names.
    Except(BTreeSet<String>),
    /// Safelist: disclose only these names.
    Only(BTreeSet<String>),
    Transform(VariableTransformFn),
}

impl RedactionPolicy {
    pub fn except<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RedactionPolicy::Except(names.into_iter().map(Into::into).collect())
    }

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RedactionPolicy::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(TransformInput<'_>) -> anyhow::Result<VariableMap> + Send + Sync + 'static,
    {
        RedactionPolicy::Transform(Arc::new(f))
    }

    /// Normalize an optional descriptor into exactly one policy.
    ///
    /// Precedence is `none`, `all`, `exceptNames`, `onlyNames`. The value
    /// of `none`/`all` is not inspected: `{"none": false}` still selects
    /// [`RedactionPolicy::None`] and `{"all": false}` still selects
    /// [`RedactionPolicy::All`].
    pub fn from_descriptor(descriptor: Option<&PolicyDescriptor>) -> Self {
        let Some(descriptor) = descriptor else {
            return RedactionPolicy::Default;
        };

        if let Some(flag) = &descriptor.none {
            if is_falsy(flag) {
                log::warn!("POLICY_FALSY_FLAG key=none value={} treated_as=none", flag);
            }
            return RedactionPolicy::None;
        }

        if let Some(flag) = &descriptor.all {
            if is_falsy(flag) {
                log::warn!("POLICY_FALSY_FLAG key=all value={} treated_as=all", flag);
            }
            return RedactionPolicy::All;
        }

        if let Some(names) = &descriptor.except_names {
            return RedactionPolicy::except(names.iter().cloned());
        }

        if let Some(names) = &descriptor.only_names {
            return RedactionPolicy::only(names.iter().cloned());
        }

        RedactionPolicy::Default
    }

    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            RedactionPolicy::Default => "default",
            RedactionPolicy::All => "all",
            RedactionPolicy::None => "none",
            RedactionPolicy::Except(_) => "except",
            RedactionPolicy::Only(_) => "only",
            RedactionPolicy::Transform(_) => "transform",
        }
    }
}

impl fmt::Debug for RedactionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedactionPolicy::Default => f.write_str("Default"),
            RedactionPolicy::All => f.write_str("All"),
            RedactionPolicy::None => f.write_str("None"),
            RedactionPolicy::Except(names) => f.debug_tuple("Except").field(names).finish(),
            RedactionPolicy::Only(names) => f.debug_tuple("Only").field(names).finish(),
            RedactionPolicy::Transform(_) => f.write_str("Transform(<fn>)"),
        }
    }
}

/// Configuration-file form of a policy.
///
/// Keys are recorded by presence; see [`RedactionPolicy::from_descriptor`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDescriptor {
    #[serde(default, deserialize_with = "present")]
    pub all: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub none: Option<Value>,
    #[serde(default)]
    pub except_names: Option<Vec<String>>,
    #[serde(default)]
    pub only_names: Option<Vec<String>>,
}

/// Keep any value, including `null`, so that key presence is observable.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(json: &str) -> PolicyDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_absent_descriptor_is_default() {
        assert!(matches!(
            RedactionPolicy::from_descriptor(None),
            RedactionPolicy::Default
        ));
        assert!(matches!(
            RedactionPolicy::from_descriptor(Some(&descriptor("{}"))),
            RedactionPolicy::Default
        ));
    }

    #[test]
    fn test_falsy_flags_keep_variant_active() {
        let none_false = descriptor(r#"{"none": false}"#);
        assert!(matches!(
            RedactionPolicy::from_descriptor(Some(&none_false)),
            RedactionPolicy::None
        ));

        let all_false = descriptor(r#"{"all": false}"#);
        assert!(matches!(
            RedactionPolicy::from_descriptor(Some(&all_false)),
            RedactionPolicy::All
        ));

        let all_null = descriptor(r#"{"all": null}"#);
        assert!(matches!(
            RedactionPolicy::from_descriptor(Some(&all_null)),
            RedactionPolicy::All
        ));
    }

    #[test]
    fn test_none_and_all_win_over_name_lists() {
        let mixed = descriptor(r#"{"all": true, "onlyNames": ["a"]}"#);
        assert!(matches!(
            RedactionPolicy::from_descriptor(Some(&mixed)),
            RedactionPolicy::All
        ));

        let both = descriptor(r#"{"all": true, "none": true}"#);
        assert!(matches!(
            RedactionPolicy::from_descriptor(Some(&both)),
            RedactionPolicy::None
        ));
    }

    #[test]
    fn test_name_lists() {
        let except = descriptor(r#"{"exceptNames": ["password"]}"#);
        match RedactionPolicy::from_descriptor(Some(&except)) {
            RedactionPolicy::Except(names) => assert!(names.contains("password")),
            other => panic!("unexpected policy {:?}", other),
        }

        let only = descriptor(r#"{"onlyNames": []}"#);
        match RedactionPolicy::from_descriptor(Some(&only)) {
            RedactionPolicy::Only(names) => assert!(names.is_empty()),
            other => panic!("unexpected policy {:?}", other),
        }
    }
}
