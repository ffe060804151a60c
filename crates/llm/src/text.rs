use serde_json::{Map, Value};

/// Strip a single surrounding Markdown code fence, if present.
///
/// Models frequently wrap SOQL or JSON answers in ```` ``` ```` blocks even
/// when told not to. Only an outermost fence (with an optional language
/// tag) is removed; inner content is untouched.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };

    // Drop the language tag line (e.g. "sql" or "json") when present.
    match body.split_once('\n') {
        Some((first_line, remainder)) if !first_line.trim().contains(' ') => remainder.trim(),
        _ => body.trim(),
    }
}

/// Interpret a model response as a JSON object of field updates.
///
/// Lenient on purpose: fences are stripped and the text must parse as a
/// JSON object — nothing else is checked before the map is forwarded to
/// the CRM.
pub fn parse_field_updates(text: &str) -> Result<Map<String, Value>, String> {
    let cleaned = strip_code_fences(text);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("model response is not a JSON object (got {})", kind(&other))),
        Err(err) => Err(format!("model response is not valid JSON: {err}")),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
