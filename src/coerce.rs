//! Lenient value coercion for model-produced JSON.
//!
//! Models emit amounts as numbers, as strings with thousands separators or
//! currency marks, as blank strings, or not at all. Blank and unparseable
//! input is treated as absent, except for statement inputs (see
//! [`statement_input_of`]) where the reconciler needs to know which is which.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

static YEAR_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{4})\s*(?:年度?|FY)?\s*$").expect("year string regex"));

/// Reads an amount from a JSON value.
pub fn amount_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Parses strings like `"1,200"`, `"¥3,400"`, `"-50"` or `"△50"` (Japanese negative mark).
pub fn parse_amount(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (negative, body) = match trimmed.strip_prefix('△').or_else(|| trimmed.strip_prefix('▲')) {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, ',' | '¥' | '￥' | ' ' | '円'))
        .collect();
    let parsed = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(if negative { -parsed } else { parsed })
}

/// Reads a statement line the reconciler derives from or into.
///
/// Absent and `null` stay `None`. A blank string is zero. A value that is
/// present but not numeric becomes `NaN`, so a derived figure that depends
/// on it keeps whatever the model supplied.
pub fn statement_input_of(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        other => Some(amount_of(other).unwrap_or(f64::NAN)),
    }
}

/// Reads a plausible fiscal year from a JSON value (`2020`, `"2020"`, `"2020年"`).
pub fn year_of(value: &Value) -> Option<i32> {
    let year = match value {
        Value::Number(n) => {
            let f = n.as_f64()?;
            if f.fract() != 0.0 {
                return None;
            }
            f as i64
        }
        Value::String(s) => YEAR_STRING_RE.captures(s)?.get(1)?.as_str().parse().ok()?,
        _ => return None,
    };
    if (MIN_YEAR as i64..=MAX_YEAR as i64).contains(&year) {
        Some(year as i32)
    } else {
        None
    }
}

pub fn is_year_like(value: &Value) -> bool {
    year_of(value).is_some()
}

/// `None` counts as zero.
pub fn n(value: Option<f64>) -> f64 {
    value.filter(|v| !v.is_nan()).unwrap_or(0.0)
}

pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(amount_of))
}

pub(crate) fn lenient_input<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(statement_input_of))
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_amount(deserializer)?.unwrap_or(0.0))
}

pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = lenient_amount(deserializer)?.unwrap_or(0.0);
    Ok(if amount <= 0.0 { 0 } else { amount.round() as u32 })
}

pub(crate) fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(year_of))
}

pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}
