//! Provider output → partial attribute map.
//!
//! Model text is often wrapped in Markdown fences or carries trailing commas.
//! Both are stripped before parsing. Anything that still does not parse yields
//! an empty map; the merger fills the gaps with `"unknown"`.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::attributes::{AttributeKey, PartialAttributes, ProviderId};
use crate::providers::RawOutput;

fn re_fence_open() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^```[a-zA-Z]*\n?").expect("fence open regex"))
}

fn re_fence_close() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"```$").expect("fence close regex"))
}

fn re_trailing_comma() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("trailing comma regex"))
}

/// Remove a leading ```` ```lang ```` and a trailing ```` ``` ````.
pub fn strip_code_fences(text: &str) -> String {
    let opened = re_fence_open().replace(text.trim(), "");
    re_fence_close().replace(opened.trim(), "").trim().to_string()
}

/// Drop commas that directly precede `}` or `]`.
pub fn strip_trailing_commas(text: &str) -> String {
    re_trailing_comma().replace_all(text, "${1}").to_string()
}

/// Clean model text and parse it as a JSON object. `None` on any failure.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let cleaned = strip_trailing_commas(&strip_code_fences(text));
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            error!(kind = json_kind(&other), "provider JSON is not an object");
            None
        }
        Err(e) => {
            error!(error = %e, "failed to parse provider JSON");
            debug!(raw = text, "raw provider text");
            None
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Keep only the keys `provider` owns, as strings.
fn owned_attributes(provider: ProviderId, map: &Map<String, Value>) -> PartialAttributes {
    map.iter()
        .filter_map(|(k, v)| {
            let key = AttributeKey::parse(k.trim())?;
            if key.owner() != provider {
                return None;
            }
            Some((key, scalar_to_string(v)?))
        })
        .collect()
}

/// Normalize one provider's raw output. Never fails; pure and idempotent.
pub fn normalize(provider: ProviderId, raw: &RawOutput) -> PartialAttributes {
    let map = match raw {
        RawOutput::Text(text) => parse_json_object(text),
        RawOutput::Structured(Value::Object(map)) => Some(map.clone()),
        RawOutput::Structured(Value::String(text)) => parse_json_object(text),
        RawOutput::Structured(other) => {
            error!(%provider, kind = json_kind(other), "structured output is not an object");
            None
        }
    };
    map.map(|m| owned_attributes(provider, &m)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_json_with_trailing_comma() {
        let raw = RawOutput::Text("```json\n{\"category\":\"shirt\",}\n```".into());
        let out = normalize(ProviderId::Gemini, &raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[&AttributeKey::Category], "shirt");
    }

    #[test]
    fn bare_fence_without_language_tag() {
        let raw = "```\n{\"neckline\": \"v-neck\", \"closure_type\": \"buttons\"}\n```";
        let out = normalize(ProviderId::Llama, &RawOutput::Text(raw.into()));
        assert_eq!(out[&AttributeKey::Neckline], "v-neck");
        assert_eq!(out[&AttributeKey::ClosureType], "buttons");
    }

    #[test]
    fn trailing_commas_in_arrays_and_objects() {
        assert_eq!(strip_trailing_commas("[1, 2, ]"), "[1, 2 ]");
        assert_eq!(strip_trailing_commas("{\"a\": 1,\n}"), "{\"a\": 1\n}");
        assert_eq!(strip_trailing_commas("{\"a\": \"x, y\"}"), "{\"a\": \"x, y\"}");
    }

    #[test]
    fn garbage_gives_empty_map() {
        let out = normalize(ProviderId::Gemini, &RawOutput::Text("I think it's a shirt.".into()));
        assert!(out.is_empty());
        let out = normalize(ProviderId::Gemini, &RawOutput::Text("[\"shirt\"]".into()));
        assert!(out.is_empty());
    }

    #[test]
    fn foreign_and_unknown_keys_are_dropped() {
        let raw = RawOutput::Text(
            r#"{"category":"jacket","color":"red","sleeve_length":"long","price":"cheap"}"#.into(),
        );
        let out = normalize(ProviderId::Gemini, &raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out[&AttributeKey::Category], "jacket");
    }

    #[test]
    fn scalars_are_stringified_and_blanks_dropped() {
        let raw = RawOutput::Structured(json!({
            "brand": "  Acme ",
            "season": 2024,
            "style": "",
            "fit": null,
            "pattern": {"kind": "striped"},
            "condition": true
        }));
        let out = normalize(ProviderId::Gemini, &raw);
        assert_eq!(out[&AttributeKey::Brand], "Acme");
        assert_eq!(out[&AttributeKey::Season], "2024");
        assert_eq!(out[&AttributeKey::Condition], "true");
        assert!(!out.contains_key(&AttributeKey::Style));
        assert!(!out.contains_key(&AttributeKey::Fit));
        assert!(!out.contains_key(&AttributeKey::Pattern));
    }

    #[test]
    fn structured_color_output() {
        let out = normalize(ProviderId::Cloud, &RawOutput::Structured(json!({"color": "red"})));
        assert_eq!(out[&AttributeKey::Color], "red");
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let raw = RawOutput::Text("```json\n{\"material\":\"denim\",\"fit\":\"slim\",}\n```".into());
        assert_eq!(
            normalize(ProviderId::Gemini, &raw),
            normalize(ProviderId::Gemini, &raw)
        );
    }
}
