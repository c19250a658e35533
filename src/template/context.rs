//! Render context helpers.
//!
//! A render context is the caller-supplied JSON object handed to a render or
//! resolve call. It is never persisted.

use serde_json::{Map, Value};

/// Caller-supplied key/value input for a single render
pub type RenderContext = Map<String, Value>;

/// Context key carrying the encounter identifier
pub const ENCOUNTER_ID_KEY: &str = "EncounterId";

/// Context key carrying an inline clinical snapshot
pub const CLINICAL_SNAPSHOT_KEY: &str = "clinical";

/// Look up a field in the context.
///
/// The exact key wins; otherwise a dotted key is followed into nested objects
/// (`patient.address.city`). Array segments accept numeric indices.
pub fn lookup<'a>(context: &'a RenderContext, field: &str) -> Option<&'a Value> {
    if let Some(value) = context.get(field) {
        return Some(value);
    }

    if !field.contains('.') {
        return None;
    }

    let mut segments = field.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a JSON value as placeholder text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // Arrays and objects keep their JSON representation
        _ => value.to_string(),
    }
}

/// Encounter identifier carried by the context, if any
pub fn encounter_id(context: &RenderContext) -> Option<String> {
    context
        .get(ENCOUNTER_ID_KEY)
        .map(value_to_text)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> RenderContext {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    #[test]
    fn test_lookup_exact_key_wins_over_path() {
        let context = ctx(json!({
            "patient.name": "flat",
            "patient": {"name": "nested"}
        }));

        assert_eq!(lookup(&context, "patient.name"), Some(&json!("flat")));
    }

    #[test]
    fn test_lookup_nested_path() {
        let context = ctx(json!({
            "patient": {"address": {"city": "Springfield"}, "phones": ["555-0100"]}
        }));

        assert_eq!(
            lookup(&context, "patient.address.city"),
            Some(&json!("Springfield"))
        );
        assert_eq!(lookup(&context, "patient.phones.0"), Some(&json!("555-0100")));
        assert_eq!(lookup(&context, "patient.address.zip"), None);
        assert_eq!(lookup(&context, "missing"), None);
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("text")), "text");
        assert_eq!(value_to_text(&json!(42)), "42");
        assert_eq!(value_to_text(&json!(true)), "true");
        assert_eq!(value_to_text(&Value::Null), "");
        assert_eq!(value_to_text(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn test_encounter_id() {
        assert_eq!(
            encounter_id(&ctx(json!({"EncounterId": 981}))),
            Some("981".to_string())
        );
        assert_eq!(encounter_id(&ctx(json!({"EncounterId": ""}))), None);
        assert_eq!(encounter_id(&ctx(json!({}))), None);
    }
}
