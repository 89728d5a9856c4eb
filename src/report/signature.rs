//! Trace keys and schema identity.
//!
//! Traces are grouped by a report key built from the operation name and a
//! normalized form of the operation text, so that operations differing only
//! in literal values, comments or formatting share a key.

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha512};

/// Key used when the request carried no operation text.
pub const PARSE_FAILURE_KEY: &str = "## GraphQLParseFailure";

lazy_static! {
    static ref BLOCK_STRING: Regex = Regex::new(r#"(?s)""".*?""""#).unwrap();
    static ref STRING: Regex = Regex::new(r#""(?:[^"\\\n]|\\.)*""#).unwrap();
    static ref COMMENT: Regex = Regex::new(r"#[^\r\n]*").unwrap();
    static ref NUMBER: Regex =
        Regex::new(r"([\s:(\[=])-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r#" ([^_a-zA-Z0-9$"])"#).unwrap();
    static ref SPACE_AFTER_PUNCT: Regex = Regex::new(r#"([^_a-zA-Z0-9$"]) "#).unwrap();
}

/// Normalize operation text into its signature.
///
/// String literals become `""`, numeric literals become `0`, comments and
/// commas are dropped and whitespace is reduced to what separates names.
pub fn operation_signature(query: &str) -> String {
    let s = BLOCK_STRING.replace_all(query, r#""""#);
    let s = STRING.replace_all(&s, r#""""#);
    let s = COMMENT.replace_all(&s, "");
    let s = s.replace(',', " ");
    let s = NUMBER.replace_all(&s, "${1}0");
    let s = WHITESPACE.replace_all(&s, " ");
    let s = SPACE_BEFORE_PUNCT.replace_all(&s, "$1");
    let s = SPACE_AFTER_PUNCT.replace_all(&s, "$1");
    s.trim().to_string()
}

/// Key a trace is reported under.
pub fn report_key(operation_name: Option<&str>, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.trim().is_empty() => format!(
            "# {}\n{}",
            operation_name.filter(|n| !n.is_empty()).unwrap_or("-"),
            operation_signature(query)
        ),
        _ => PARSE_FAILURE_KEY.to_string(),
    }
}

/// Hex SHA-512 of the schema document, used as the schema identity.
pub fn schema_hash(schema_sdl: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(schema_sdl.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_strips_literals_and_whitespace() {
        let query = r#"
            # fetch a user
            query GetUser {
              user(id: "abc", limit: 10, ratio: -1.5e3) {
                name,
                friends(first: 5) { name }
              }
            }
        "#;

        assert_eq!(
            operation_signature(query),
            r#"query GetUser{user(id:"" limit:0 ratio:0){name friends(first:0){name}}}"#
        );
    }

    #[test]
    fn test_signature_keeps_names_with_digits() {
        assert_eq!(
            operation_signature("query Q($v1: Int = 3) { a1(x: $v1) }"),
            "query Q($v1:Int=0){a1(x:$v1)}"
        );
    }

    #[test]
    fn test_equivalent_operations_share_key() {
        let a = report_key(Some("Q"), Some(r#"query Q { a(s: "x") }"#));
        let b = report_key(Some("Q"), Some("query Q {\n  a(s: \"other\")\n}"));
        assert_eq!(a, b);
        assert!(a.starts_with("# Q\n"));
    }

    #[test]
    fn test_report_key_without_name_or_query() {
        assert!(report_key(None, Some("{ a }")).starts_with("# -\n"));
        assert_eq!(report_key(Some("Q"), None), PARSE_FAILURE_KEY);
        assert_eq!(report_key(Some("Q"), Some("  ")), PARSE_FAILURE_KEY);
    }

    #[test]
    fn test_schema_hash() {
        let hash = schema_hash("type Query { a: Int }");
        assert_eq!(hash.len(), 128);
        assert_eq!(hash, schema_hash("type Query { a: Int }"));
        assert_ne!(hash, schema_hash("type Query { b: Int }"));
    }
}
