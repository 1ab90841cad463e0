use serde_json::Value;

/// Normalize a JSON id (number or string) into a sanitized string.
/// Returns `None` for null, empty strings, and structured values.
pub fn value_to_id(value: Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    let cleaned = sanitize(raw);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn sanitize(s: String) -> String {
    s.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
}
