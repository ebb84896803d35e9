use super::{
    classify, entry_year, is_line_salvage, locate_primary, scan_year_markers, Primary, RawShape,
    MAX_NESTING,
};
use crate::coerce::year_of;
use crate::extract::parse_loose;
use crate::salvage::Salvage;
use crate::schema::Newsletter;
use serde_json::Value;

const PRIMARY_KEY: &str = "newsletters";
const CONTENT_KEYS: [&str; 5] = ["content", "text", "body", "markdown", "article"];

/// Coerces a parsed newsletter response into a list of `{ year, content }`.
pub fn normalize_newsletters(
    parsed: Option<&Value>,
    expected_years: &[i32],
    raw: &str,
) -> Salvage<Vec<Newsletter>> {
    match parsed {
        Some(value) => normalize_value(value, expected_years, raw, 0),
        None => from_raw_text(raw, expected_years),
    }
}

fn normalize_value(
    value: &Value,
    expected_years: &[i32],
    raw: &str,
    depth: u8,
) -> Salvage<Vec<Newsletter>> {
    match locate_primary(value, PRIMARY_KEY) {
        Primary::Array {
            items,
            foreign_key: None,
        } => from_array(items, expected_years, raw, depth),
        Primary::Array {
            items,
            foreign_key: Some(key),
        } => from_array(items, expected_years, raw, depth)
            .downgrade(format!("newsletters found under '{}'", key)),
        Primary::Single(entry) => from_array(std::slice::from_ref(entry), expected_years, raw, depth)
            .downgrade("single newsletter object instead of an array"),
        Primary::Text(text) => unwrap_nested(text, expected_years, raw, depth),
        Primary::Missing => from_raw_text(raw, expected_years),
    }
}

fn unwrap_nested(
    text: &str,
    expected_years: &[i32],
    raw: &str,
    depth: u8,
) -> Salvage<Vec<Newsletter>> {
    if depth >= MAX_NESTING {
        return from_raw_text(raw, expected_years);
    }
    match parse_loose(text) {
        Some(inner @ (Value::Object(_) | Value::Array(_))) if !is_line_salvage(&inner, text) => {
            normalize_value(&inner, expected_years, raw, depth + 1)
                .downgrade("newsletters encoded as a JSON string")
        }
        _ => from_raw_text(text, expected_years),
    }
}

fn from_array(
    items: &[Value],
    expected_years: &[i32],
    raw: &str,
    depth: u8,
) -> Salvage<Vec<Newsletter>> {
    match classify(items, PRIMARY_KEY) {
        RawShape::Objects(entries) => {
            let mut backfilled = false;
            let mut newsletters = Vec::new();
            for (idx, entry) in entries.iter().enumerate() {
                let (year, was_backfilled) = entry_year(entry, idx, expected_years);
                backfilled |= was_backfilled;
                if let Some(year) = year {
                    newsletters.push(Newsletter {
                        year,
                        content: text_of(entry),
                    });
                }
            }
            let newsletters = dedupe(newsletters);
            if newsletters.is_empty() {
                from_raw_text(raw, expected_years)
            } else if backfilled {
                Salvage::degraded(newsletters, "year backfilled from position")
            } else {
                Salvage::Trusted(newsletters)
            }
        }
        RawShape::Alternating(items) => {
            let newsletters = items
                .chunks(2)
                .filter_map(|pair| {
                    Some(Newsletter {
                        year: year_of(&pair[0])?,
                        content: text_of(&pair[1]),
                    })
                })
                .collect();
            Salvage::degraded(dedupe(newsletters), "alternating year/content array")
        }
        RawShape::YearsOnly(years) => {
            let newsletters = years
                .into_iter()
                .map(|year| Newsletter {
                    year,
                    content: String::new(),
                })
                .collect();
            Salvage::degraded(dedupe(newsletters), "bare years without content")
        }
        RawShape::NestedJson(text) => unwrap_nested(text, expected_years, raw, depth),
        RawShape::Tagged(tagged) => {
            let newsletters = tagged
                .into_iter()
                .map(|(year, content)| Newsletter { year, content })
                .collect();
            Salvage::degraded(dedupe(newsletters), "year-tagged strings")
        }
        RawShape::Empty | RawShape::Garbage => from_raw_text(raw, expected_years),
    }
}

fn from_raw_text(raw: &str, expected_years: &[i32]) -> Salvage<Vec<Newsletter>> {
    let markers = scan_year_markers(raw, expected_years);
    if markers.is_empty() {
        return Salvage::failed("no recognizable newsletter structure");
    }
    let newsletters = markers
        .into_iter()
        .map(|(year, content)| Newsletter { year, content })
        .collect();
    Salvage::degraded(dedupe(newsletters), "newsletters recovered from raw response text")
}

/// Body text of a newsletter entry, whatever field the model chose for it.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Object(map) => CONTENT_KEYS
            .iter()
            .chain(std::iter::once(&"title"))
            .find_map(|key| match map.get(*key) {
                Some(Value::String(text)) if !text.trim().is_empty() => {
                    Some(text.trim().to_string())
                }
                _ => None,
            })
            .unwrap_or_default(),
        Value::Array(parts) => parts
            .iter()
            .map(text_of)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One newsletter per year; a later duplicate only fills an empty body.
fn dedupe(newsletters: Vec<Newsletter>) -> Vec<Newsletter> {
    let mut merged: Vec<Newsletter> = Vec::new();
    for letter in newsletters {
        match merged.iter_mut().find(|existing| existing.year == letter.year) {
            Some(existing) if existing.content.is_empty() => existing.content = letter.content,
            Some(_) => {}
            None => merged.push(letter),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(result: Salvage<Vec<Newsletter>>) -> Vec<(i32, String)> {
        result
            .into_value()
            .unwrap_or_default()
            .into_iter()
            .map(|n| (n.year, n.content))
            .collect()
    }

    #[test]
    fn test_canonical_shape_is_trusted() {
        let parsed = json!({"newsletters": [{"year": 2020, "content": "# 創業"}]});
        let result = normalize_newsletters(Some(&parsed), &[2020], "");
        assert!(result.is_trusted());
        assert_eq!(pairs(result), vec![(2020, "# 創業".to_string())]);
    }

    #[test]
    fn test_alternating_array() {
        let parsed = json!({"newsletters": [2020, "text A", 2021, "text B"]});
        let result = normalize_newsletters(Some(&parsed), &[2020, 2021], "");
        assert!(!result.is_trusted());
        assert_eq!(
            pairs(result),
            vec![(2020, "text A".to_string()), (2021, "text B".to_string())]
        );
    }

    #[test]
    fn test_alternate_content_keys() {
        let parsed = json!({"newsletters": [
            {"year": "2020", "body": "本文"},
            {"year": 2021, "title": "見出しのみ"}
        ]});
        let letters = pairs(normalize_newsletters(Some(&parsed), &[2020, 2021], ""));
        assert_eq!(letters[0], (2020, "本文".to_string()));
        assert_eq!(letters[1], (2021, "見出しのみ".to_string()));
    }

    #[test]
    fn test_tagged_strings() {
        let parsed = json!(["Year: 2020 新製品発表", "Year: 2021 海外進出"]);
        let letters = pairs(normalize_newsletters(Some(&parsed), &[2020, 2021], ""));
        assert_eq!(
            letters,
            vec![
                (2020, "新製品発表".to_string()),
                (2021, "海外進出".to_string())
            ]
        );
    }

    #[test]
    fn test_duplicate_years_keep_first_content() {
        let parsed = json!({"newsletters": [
            {"year": 2020, "content": ""},
            {"year": 2020, "content": "second"},
            {"year": 2020, "content": "third"}
        ]});
        let letters = pairs(normalize_newsletters(Some(&parsed), &[2020], ""));
        assert_eq!(letters, vec![(2020, "second".to_string())]);
    }

    #[test]
    fn test_plain_text_with_year_headings() {
        let raw = "2020年度\n創業の年でした。\n2021年度\n拡大の年でした。";
        let parsed = parse_loose(raw);
        let letters = pairs(normalize_newsletters(parsed.as_ref(), &[2020, 2021], raw));
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].0, 2020);
        assert!(letters[0].1.contains("創業"));
        assert!(letters[1].1.contains("拡大"));
    }

    #[test]
    fn test_nothing_recoverable() {
        let parsed = json!({"error": "quota"});
        let result = normalize_newsletters(Some(&parsed), &[2020], "{\"error\": \"quota\"}");
        assert!(result.is_failed());
    }
}
