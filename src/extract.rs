//! Best-effort JSON recovery from free-form model output.

use crate::salvage::Salvage;
use log::debug;
use serde_json::Value;

/// Parses `text` with a fallback chain and returns whatever could be salvaged.
///
/// Stages, first success wins:
/// 1. the trimmed text (markdown fences removed) as JSON
/// 2. the span from the first `{` to the last `}`
/// 3. the span from the first `[` to the last `]`
/// 4. every non-empty line, parsed as JSON where possible and kept as a raw
///    string otherwise
pub fn parse_loose(text: &str) -> Option<Value> {
    extract_json(text).into_value()
}

/// Same chain as [`parse_loose`], reporting which stage produced the value.
pub fn extract_json(text: &str) -> Salvage<Value> {
    let trimmed = strip_code_fence(text.trim());

    if trimmed.is_empty() {
        return Salvage::failed("empty response");
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Salvage::Trusted(value);
    }

    if let Some(value) = parse_span(trimmed, '{', '}') {
        debug!("Recovered JSON object embedded in surrounding text");
        return Salvage::degraded(value, "object extracted from surrounding text");
    }

    if let Some(value) = parse_span(trimmed, '[', ']') {
        debug!("Recovered JSON array embedded in surrounding text");
        return Salvage::degraded(value, "array extracted from surrounding text");
    }

    let lines: Vec<Value> = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<Value>(line).unwrap_or_else(|_| Value::String(line.to_string()))
        })
        .collect();

    if lines.is_empty() {
        return Salvage::failed("no JSON content found");
    }

    debug!("Falling back to line-by-line salvage ({} lines)", lines.len());
    Salvage::degraded(Value::Array(lines), "salvaged line by line")
}

fn parse_span(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    let Some(body_start) = text.find('\n') else {
        return text;
    };
    let body = &text[body_start + 1..];
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_parse_is_trusted() {
        let result = extract_json(r#"  {"years": [2020]}  "#);
        assert!(result.is_trusted());
        assert_eq!(result.into_value(), Some(json!({"years": [2020]})));
    }

    #[test]
    fn test_object_wrapped_in_prose() {
        let text = "Here is the data you asked for:\n{\"newsletters\": []}\nHope it helps!";
        let result = extract_json(text);
        assert!(!result.is_trusted());
        assert_eq!(result.into_value(), Some(json!({"newsletters": []})));
    }

    #[test]
    fn test_array_wrapped_in_prose() {
        assert_eq!(
            parse_loose("result => [1, 2, 3] <= end"),
            Some(json!([1, 2, 3]))
        );
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let text = "```json\n{\"a\": 1}\n```";
        let result = extract_json(text);
        assert!(result.is_trusted());
        assert_eq!(result.into_value(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_line_fallback_mixes_json_and_raw_lines() {
        let text = "{\"year\": 2020\n\n2021\nnot json at all";
        assert_eq!(
            parse_loose(text),
            Some(json!(["{\"year\": 2020", 2021, "not json at all"]))
        );
    }

    #[test]
    fn test_plain_prose_becomes_single_string() {
        assert_eq!(parse_loose("not json"), Some(json!(["not json"])));
    }

    #[test]
    fn test_empty_input_is_none() {
        assert_eq!(parse_loose(""), None);
        assert_eq!(parse_loose("   \n\n  "), None);
    }

    #[test]
    fn test_closing_brace_before_opening_falls_through() {
        let value = parse_loose("} oops {").unwrap();
        assert_eq!(value, json!(["} oops {"]));
    }
}
