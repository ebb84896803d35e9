//! Structural repair of parsed-but-malformed model responses.
//!
//! Each normalizer first locates the primary payload, classifies it into a
//! [`RawShape`] and then repairs that shape. Normalizers are total: the worst
//! outcome is [`Salvage::Failed`](crate::salvage::Salvage::Failed).

pub mod journal;
pub mod newsletter;

pub use journal::{ensure_year_months, normalize_journal};
pub use newsletter::normalize_newsletters;

use crate::coerce::{is_year_like, year_of, MAX_YEAR, MIN_YEAR};
use crate::extract::parse_loose;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Nested JSON strings are unwrapped at most this many times.
pub(crate) const MAX_NESTING: u8 = 3;

static YEAR_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)year\s*:\s*(\d{4})").expect("year tag regex"));

static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit run regex"));

/// Classified form of the primary array of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum RawShape<'a> {
    Empty,
    /// Array of entry objects.
    Objects(&'a [Value]),
    /// `[year, content, year, content, ...]`.
    Alternating(&'a [Value]),
    /// Bare years with no content.
    YearsOnly(Vec<i32>),
    /// A single string that itself encodes the whole response.
    NestedJson(&'a str),
    /// Strings carrying a `Year: NNNN` tag, split into year and remaining text.
    Tagged(Vec<(i32, String)>),
    /// No recognizable structure.
    Garbage,
}

pub fn classify<'a>(items: &'a [Value], primary_key: &str) -> RawShape<'a> {
    if items.is_empty() {
        return RawShape::Empty;
    }

    if let [Value::String(text)] = items {
        let encodes_response = matches!(
            parse_loose(text),
            Some(Value::Object(ref map)) if map.contains_key(primary_key)
        );
        if encodes_response {
            return RawShape::NestedJson(text);
        }
    }

    if items.iter().all(Value::is_object) {
        return RawShape::Objects(items);
    }

    if items.iter().all(is_year_like) {
        return RawShape::YearsOnly(items.iter().filter_map(year_of).collect());
    }

    if is_alternating(items) {
        return RawShape::Alternating(items);
    }

    if items.iter().all(Value::is_string) {
        let tagged: Vec<(i32, String)> = items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(split_year_tag)
            .collect();
        if !tagged.is_empty() {
            return RawShape::Tagged(tagged);
        }
    }

    RawShape::Garbage
}

fn is_alternating(items: &[Value]) -> bool {
    items.len() >= 2
        && items.len() % 2 == 0
        && items.chunks(2).all(|pair| {
            is_year_like(&pair[0])
                && !is_year_like(&pair[1])
                && matches!(pair[1], Value::String(_) | Value::Object(_) | Value::Array(_))
        })
}

/// Splits `"Year: 2020 ..."` into `(2020, "...")`.
pub(crate) fn split_year_tag(text: &str) -> Option<(i32, String)> {
    let caps = YEAR_TAG_RE.captures(text)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }
    let whole = caps.get(0)?;
    let rest = format!("{}{}", &text[..whole.start()], &text[whole.end()..]);
    Some((year, trim_marker_noise(&rest).to_string()))
}

/// Where the primary payload of a response lives.
#[derive(Debug)]
pub(crate) enum Primary<'a> {
    /// The expected array; `foreign_key` names the field it was found under
    /// when that was not the expected key.
    Array {
        items: &'a [Value],
        foreign_key: Option<&'a str>,
    },
    /// A single entry object instead of an array.
    Single(&'a Value),
    /// A string that may itself be JSON.
    Text(&'a str),
    Missing,
}

pub(crate) fn locate_primary<'a>(parsed: &'a Value, primary_key: &str) -> Primary<'a> {
    match parsed {
        Value::Object(map) => match map.get(primary_key) {
            Some(Value::Array(items)) => Primary::Array {
                items,
                foreign_key: None,
            },
            Some(entry @ Value::Object(_)) => Primary::Single(entry),
            Some(Value::String(text)) => Primary::Text(text),
            Some(_) => Primary::Missing,
            None if map.contains_key("year") => Primary::Single(parsed),
            None => map
                .iter()
                .find_map(|(key, value)| match value {
                    Value::Array(items) if !items.is_empty() => Some(Primary::Array {
                        items,
                        foreign_key: Some(key.as_str()),
                    }),
                    _ => None,
                })
                .unwrap_or(Primary::Missing),
        },
        Value::Array(items) => Primary::Array {
            items,
            foreign_key: None,
        },
        Value::String(text) => Primary::Text(text),
        _ => Primary::Missing,
    }
}

/// Finds year markers in free text and slices the text between them.
///
/// `Year: NNNN` tags win; otherwise bare four-digit runs are used, restricted
/// to `expected_years` when that list is non-empty. Each year is kept once, at
/// its first occurrence.
pub fn scan_year_markers(raw: &str, expected_years: &[i32]) -> Vec<(i32, String)> {
    let mut markers: Vec<(i32, usize, usize)> = YEAR_TAG_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            Some((year, whole.start(), whole.end()))
        })
        .filter(|(year, _, _)| (MIN_YEAR..=MAX_YEAR).contains(year))
        .collect();

    if markers.is_empty() {
        markers = DIGIT_RUN_RE
            .find_iter(raw)
            .filter(|m| m.as_str().len() == 4)
            .filter_map(|m| {
                let year: i32 = m.as_str().parse().ok()?;
                let plausible = if expected_years.is_empty() {
                    (MIN_YEAR..=MAX_YEAR).contains(&year)
                } else {
                    expected_years.contains(&year)
                };
                plausible.then_some((year, m.start(), m.end()))
            })
            .collect();
    }

    let mut seen = Vec::new();
    markers.retain(|(year, _, _)| {
        if seen.contains(year) {
            false
        } else {
            seen.push(*year);
            true
        }
    });

    markers
        .iter()
        .enumerate()
        .map(|(idx, &(year, _, end))| {
            let stop = markers.get(idx + 1).map_or(raw.len(), |next| next.1);
            (year, trim_marker_noise(&raw[end..stop]).to_string())
        })
        .collect()
}

fn trim_marker_noise(text: &str) -> &str {
    let is_noise =
        |c: char| c.is_whitespace() || matches!(c, ':' | ',' | '"' | '\'' | '{' | '}' | '[' | ']');
    text.trim_start_matches(|c: char| is_noise(c) || matches!(c, '年' | '度' | '-'))
        .trim_end_matches(is_noise)
}

/// True when the extractor fell back to wrapping plain text line by line.
pub(crate) fn is_line_salvage(parsed: &Value, text: &str) -> bool {
    match parsed {
        Value::Array(lines) => {
            lines.iter().all(Value::is_string) && !text.trim_start().starts_with('[')
        }
        _ => false,
    }
}

/// Year for entry `idx`: its own `year` field, else the expected year at that position.
pub(crate) fn entry_year(entry: &Value, idx: usize, expected_years: &[i32]) -> (Option<i32>, bool) {
    match entry.get("year").and_then(year_of) {
        Some(year) => (Some(year), false),
        None => (expected_years.get(idx).copied(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_shapes() {
        let objects = vec![json!({"year": 2020})];
        assert!(matches!(classify(&objects, "years"), RawShape::Objects(_)));

        let years = vec![json!(2020), json!("2021")];
        assert_eq!(
            classify(&years, "years"),
            RawShape::YearsOnly(vec![2020, 2021])
        );

        let alternating = vec![json!(2020), json!("a"), json!(2021), json!("b")];
        assert!(matches!(
            classify(&alternating, "newsletters"),
            RawShape::Alternating(_)
        ));

        let nested = vec![json!(r#"{"years": [{"year": 2020}]}"#)];
        assert!(matches!(classify(&nested, "years"), RawShape::NestedJson(_)));

        let tagged = vec![json!("Year: 2020 好調"), json!("Year:2021 低調")];
        assert_eq!(
            classify(&tagged, "newsletters"),
            RawShape::Tagged(vec![
                (2020, "好調".to_string()),
                (2021, "低調".to_string())
            ])
        );

        let garbage = vec![json!(1), json!(2), json!(3)];
        assert_eq!(classify(&garbage, "years"), RawShape::Garbage);
        assert_eq!(classify(&[], "years"), RawShape::Empty);
    }

    #[test]
    fn test_locate_primary_foreign_key() {
        let parsed = json!({"data": [2020, 2021], "note": "x"});
        match locate_primary(&parsed, "years") {
            Primary::Array { items, foreign_key } => {
                assert_eq!(items.len(), 2);
                assert_eq!(foreign_key, Some("data"));
            }
            other => panic!("unexpected primary: {:?}", other),
        }
    }

    #[test]
    fn test_scan_prefers_year_tags() {
        let raw = "Year: 2020 first 1500 yen\nYear: 2021 second";
        let found = scan_year_markers(raw, &[]);
        assert_eq!(
            found,
            vec![
                (2020, "first 1500 yen".to_string()),
                (2021, "second".to_string())
            ]
        );
    }

    #[test]
    fn test_scan_bare_years_limited_to_expected() {
        let raw = "2020年度は売上1500百万円。2021年度は新工場。2020年の振り返り";
        let found = scan_year_markers(raw, &[2020, 2021]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, 2020);
        assert_eq!(found[0].1, "は売上1500百万円。");
        assert_eq!(found[1].0, 2021);
        assert!(found[1].1.starts_with("は新工場。"));
    }
}
