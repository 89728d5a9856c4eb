//! Request header redaction.
//!
//! Unlike variables, undisclosed headers are omitted entirely. Credentials
//! are never disclosed, whatever the policy says.

use std::collections::{BTreeMap, BTreeSet};

use crate::report::models::HttpMetadata;

use super::policy::RedactionPolicy;

/// Header names dropped before any policy is consulted.
pub const ALWAYS_EXCLUDED_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Raw request headers: name (any case) -> values in arrival order.
pub type HeaderMultimap = BTreeMap<String, Vec<String>>;

/// Disclosed headers: lowercase name -> values.
pub type RedactedHeaderMap = BTreeMap<String, Vec<String>>;

/// Write the headers `policy` allows into `http.request_headers`.
pub fn redact_headers(original: &HeaderMultimap, policy: &RedactionPolicy, http: &mut HttpMetadata) {
    let filter = match policy {
        RedactionPolicy::Default | RedactionPolicy::None => return,
        RedactionPolicy::Transform(_) => {
            log::warn!("HEADER_POLICY_UNSUPPORTED kind=transform treated_as=none");
            return;
        }
        RedactionPolicy::All => NameFilter::Any,
        RedactionPolicy::Except(names) => NameFilter::Except(lowercase(names)),
        RedactionPolicy::Only(names) => NameFilter::Only(lowercase(names)),
    };

    for (name, values) in original {
        let name = name.to_ascii_lowercase();
        if ALWAYS_EXCLUDED_HEADERS.contains(&name.as_str()) || !filter.allows(&name) {
            continue;
        }
        http.request_headers
            .entry(name)
            .or_default()
            .extend(values.iter().cloned());
    }
}

/// Convenience wrapper returning a fresh map.
pub fn redacted_headers(original: &HeaderMultimap, policy: &RedactionPolicy) -> RedactedHeaderMap {
    let mut http = HttpMetadata::default();
    redact_headers(original, policy, &mut http);
    http.request_headers
}

enum NameFilter {
    Any,
    Except(BTreeSet<String>),
    Only(BTreeSet<String>),
}

impl NameFilter {
    fn allows(&self, lowercase_name: &str) -> bool {
        match self {
            NameFilter::Any => true,
            NameFilter::Except(names) => !names.contains(lowercase_name),
            NameFilter::Only(names) => names.contains(lowercase_name),
        }
    }
}

fn lowercase(names: &BTreeSet<String>) -> BTreeSet<String> {
    names.iter().map(|n| n.to_ascii_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> HeaderMultimap {
        let mut h = HeaderMultimap::new();
        h.insert("Authorization".to_string(), vec!["Bearer secret".to_string()]);
        h.insert("cookie".to_string(), vec!["session=abc".to_string()]);
        h.insert("Set-Cookie".to_string(), vec!["id=1".to_string()]);
        h.insert("Content-Type".to_string(), vec!["application/json".to_string()]);
        h.insert(
            "X-Forwarded-For".to_string(),
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
        );
        h
    }

    #[test]
    fn test_default_and_none_disclose_nothing() {
        assert!(redacted_headers(&headers(), &RedactionPolicy::Default).is_empty());
        assert!(redacted_headers(&headers(), &RedactionPolicy::None).is_empty());
    }

    #[test]
    fn test_all_discloses_everything_but_credentials() {
        let out = redacted_headers(&headers(), &RedactionPolicy::All);
        assert_eq!(
            out.keys().collect::<Vec<_>>(),
            vec!["content-type", "x-forwarded-for"]
        );
        assert_eq!(out["x-forwarded-for"], vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_safelist_cannot_name_credentials() {
        let policy = RedactionPolicy::only(["authorization", "COOKIE", "set-cookie", "content-type"]);
        let out = redacted_headers(&headers(), &policy);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["content-type"]);
    }

    #[test]
    fn test_blocklist_drops_named_headers() {
        let policy = RedactionPolicy::except(["x-forwarded-for"]);
        let out = redacted_headers(&headers(), &policy);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["content-type"]);
    }

    #[test]
    fn test_transform_discloses_nothing() {
        let policy = RedactionPolicy::transform(|input| Ok(input.variables.clone()));
        assert!(redacted_headers(&headers(), &policy).is_empty());
    }

    #[test]
    fn test_mixed_case_spellings_merge() {
        let mut h = HeaderMultimap::new();
        h.insert("X-Trace".to_string(), vec!["a".to_string()]);
        h.insert("x-trace".to_string(), vec!["b".to_string()]);

        let out = redacted_headers(&h, &RedactionPolicy::All);
        assert_eq!(out["x-trace"], vec!["a", "b"]);
    }
}
