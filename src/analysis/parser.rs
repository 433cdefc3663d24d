//! Reply parsing: structured JSON extraction with a markdown fallback.
//!
//! LLM replies come in three flavours: pure JSON, JSON wrapped in a fenced
//! code block with commentary around it, and free prose. This module tries
//! them in that order and never fails — an undecodable reply is returned
//! verbatim as [`Reply::Markdown`] so the rest of the pipeline treats it as
//! valid, lower-fidelity output rather than an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A parsed backend reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The reply decoded into structured JSON.
    Structured(Value),
    /// The reply kept verbatim as free-form text.
    Markdown(String),
}

/// Parse a raw backend reply.
///
/// Attempts, in order:
/// 1. decode the entire reply as JSON;
/// 2. extract the content between the first ```` ```json ```` fence and the
///    next ```` ``` ```` fence and decode that substring;
/// 3. return the raw reply tagged as free-form.
pub fn parse(raw: &str) -> Reply {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Reply::Structured(value);
    }

    if let Some(fenced) = extract_fenced_json(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced.trim()) {
            return Reply::Structured(value);
        }
    }

    Reply::Markdown(raw.to_string())
}

/// The substring between the first ```` ```json ```` marker and the next fence.
fn extract_fenced_json(raw: &str) -> Option<&str> {
    let start = raw.find("```json")? + "```json".len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

/// Parse a reply expected to contain a JSON array of field names.
///
/// Accepts a bare array, an array behind a fence, or an object holding an
/// array under `fields`. Anything else yields an empty list — field
/// discovery must never block the downstream stages.
pub fn parse_field_list(raw: &str) -> Vec<String> {
    let value = match parse(raw) {
        Reply::Structured(v) => v,
        Reply::Markdown(_) => return Vec::new(),
    };

    let array = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("fields").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    array
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect()
}

static RE_FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// The first integer literal anywhere in the raw reply.
///
/// Last-resort fallback for count estimation when structured parsing fails
/// entirely.
pub fn first_integer(raw: &str) -> Option<u64> {
    RE_FIRST_INTEGER.find(raw)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_reply_json_decodes() {
        let reply = parse(r#"{"document_type": "invoice", "keywords": ["a"]}"#);
        assert_eq!(
            reply,
            Reply::Structured(json!({"document_type": "invoice", "keywords": ["a"]}))
        );
    }

    #[test]
    fn fenced_json_is_extracted() {
        let reply = parse("comment ```json\n{\"a\":1}\n``` ");
        assert_eq!(reply, Reply::Structured(json!({"a": 1})));
    }

    #[test]
    fn fenced_json_with_trailing_prose() {
        let raw = "Here is the result:\n```json\n{\"document_type\": \"receipt\"}\n```\nHope that helps!";
        assert_eq!(
            parse(raw),
            Reply::Structured(json!({"document_type": "receipt"}))
        );
    }

    #[test]
    fn prose_falls_back_to_markdown() {
        let reply = parse("no json here");
        assert_eq!(reply, Reply::Markdown("no json here".to_string()));
    }

    #[test]
    fn broken_fence_falls_back_to_markdown() {
        // Opening fence but no closing fence and invalid body.
        let raw = "```json\n{not valid";
        assert!(matches!(parse(raw), Reply::Markdown(_)));
    }

    #[test]
    fn field_list_accepts_bare_array() {
        let fields = parse_field_list(r#"["invoice_number", "vendor"]"#);
        assert_eq!(fields, vec!["invoice_number", "vendor"]);
    }

    #[test]
    fn field_list_accepts_fenced_array() {
        let fields = parse_field_list("```json\n[\"total_amount\"]\n```");
        assert_eq!(fields, vec!["total_amount"]);
    }

    #[test]
    fn field_list_accepts_fields_object() {
        let fields = parse_field_list(r#"{"fields": ["a", "b"]}"#);
        assert_eq!(fields, vec!["a", "b"]);
    }

    #[test]
    fn field_list_never_fails() {
        assert!(parse_field_list("sorry, I can't do that").is_empty());
        assert!(parse_field_list(r#"{"unrelated": 1}"#).is_empty());
        assert!(parse_field_list(r#"[1, 2, 3]"#).is_empty());
    }

    #[test]
    fn first_integer_scans_prose() {
        assert_eq!(first_integer("I believe there are 3 documents."), Some(3));
        assert_eq!(first_integer("none that I can see"), None);
    }
}
