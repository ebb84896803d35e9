use super::{
    classify, entry_year, is_line_salvage, locate_primary, scan_year_markers, Primary, RawShape, MAX_NESTING,
};
use crate::coerce::year_of;
use crate::extract::parse_loose;
use crate::salvage::Salvage;
use crate::schema::{JournalBook, JournalLine, JournalMonth, JournalYear};
use crate::utils::{fiscal_month_index, month_label, FISCAL_MONTHS};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const PRIMARY_KEY: &str = "years";

static KANJI_MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s*月").expect("kanji month regex"));
static ISO_MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}\s*[-/.年]\s*(\d{1,2})").expect("iso month regex"));

const ENGLISH_MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Coerces a parsed journal response into `{ years: [{ year, months }] }`.
///
/// `parsed` is the extractor's output (if any) and `raw` the full response
/// text, used as a last resort when the parsed structure is unusable.
pub fn normalize_journal(
    parsed: Option<&Value>,
    expected_years: &[i32],
    raw: &str,
) -> Salvage<JournalBook> {
    match parsed {
        Some(value) => normalize_value(value, expected_years, raw, 0),
        None => from_raw_text(raw, expected_years),
    }
}

fn normalize_value(value: &Value, expected_years: &[i32], raw: &str, depth: u8) -> Salvage<JournalBook> {
    match locate_primary(value, PRIMARY_KEY) {
        Primary::Array {
            items,
            foreign_key: None,
        } => from_array(items, expected_years, raw, depth),
        Primary::Array {
            items,
            foreign_key: Some(key),
        } => from_array(items, expected_years, raw, depth)
            .downgrade(format!("journal years found under '{}'", key)),
        Primary::Single(entry) => {
            from_array(std::slice::from_ref(entry), expected_years, raw, depth)
                .downgrade("single year object instead of an array")
        }
        Primary::Text(text) => unwrap_nested(text, expected_years, raw, depth),
        Primary::Missing => from_raw_text(raw, expected_years),
    }
}

fn unwrap_nested(text: &str, expected_years: &[i32], raw: &str, depth: u8) -> Salvage<JournalBook> {
    if depth >= MAX_NESTING {
        return from_raw_text(raw, expected_years);
    }
    match parse_loose(text) {
        Some(inner @ (Value::Object(_) | Value::Array(_))) if !is_line_salvage(&inner, text) => {
            normalize_value(&inner, expected_years, raw, depth + 1)
                .downgrade("journal encoded as a JSON string")
        }
        _ => from_raw_text(raw, expected_years),
    }
}

fn from_array(items: &[Value], expected_years: &[i32], raw: &str, depth: u8) -> Salvage<JournalBook> {
    match classify(items, PRIMARY_KEY) {
        RawShape::Objects(entries) => {
            let mut backfilled = false;
            let mut years = Vec::new();
            for (idx, entry) in entries.iter().enumerate() {
                let (year, was_backfilled) = entry_year(entry, idx, expected_years);
                backfilled |= was_backfilled;
                let Some(year) = year else {
                    debug!("Dropping journal entry {} with no recoverable year", idx);
                    continue;
                };
                let months = entry.get("months").map(months_of).unwrap_or_else(|| {
                    ["entries", "items", "journal"]
                        .iter()
                        .find_map(|key| entry.get(*key))
                        .map(months_of)
                        .unwrap_or_default()
                });
                years.push(JournalYear { year, months });
            }
            let book = finish(years);
            if book.years.is_empty() {
                return from_raw_text(raw, expected_years);
            }
            if backfilled {
                Salvage::degraded(book, "year backfilled from position")
            } else {
                Salvage::Trusted(book)
            }
        }
        RawShape::Alternating(items) => {
            let years = items
                .chunks(2)
                .filter_map(|pair| {
                    Some(JournalYear {
                        year: year_of(&pair[0])?,
                        months: months_of(&pair[1]),
                    })
                })
                .collect();
            Salvage::degraded(finish(years), "alternating year/content array")
        }
        RawShape::YearsOnly(list) => {
            let years = list
                .into_iter()
                .map(|year| JournalYear {
                    year,
                    months: Vec::new(),
                })
                .collect();
            Salvage::degraded(finish(years), "bare years without months")
        }
        RawShape::NestedJson(text) => unwrap_nested(text, expected_years, raw, depth),
        RawShape::Tagged(tagged) => {
            let years = tagged
                .into_iter()
                .map(|(year, rest)| JournalYear {
                    year,
                    months: parse_loose(&rest).as_ref().map(months_of).unwrap_or_default(),
                })
                .collect();
            Salvage::degraded(finish(years), "year-tagged strings")
        }
        RawShape::Empty | RawShape::Garbage => from_raw_text(raw, expected_years),
    }
}

fn from_raw_text(raw: &str, expected_years: &[i32]) -> Salvage<JournalBook> {
    let markers = scan_year_markers(raw, expected_years);
    if markers.is_empty() {
        return Salvage::failed("no recognizable journal structure");
    }
    let years = markers
        .into_iter()
        .map(|(year, slice)| JournalYear {
            year,
            months: parse_loose(&slice).as_ref().map(months_of).unwrap_or_default(),
        })
        .collect();
    Salvage::degraded(finish(years), "years recovered from raw response text")
}

/// Reads month buckets from whatever the model put under a year.
fn months_of(value: &Value) -> Vec<JournalMonth> {
    match value {
        Value::Object(map) => {
            if let Some(months) = map.get("months") {
                return months_of(months);
            }
            if map.contains_key("items") {
                return vec![month_from_object(value)];
            }
            if is_journal_row(value) {
                return group_rows_by_month(std::slice::from_ref(value));
            }
            Vec::new()
        }
        Value::Array(items) => {
            if items.iter().any(is_journal_row) {
                return group_rows_by_month(items);
            }
            items
                .iter()
                .filter(|item| item.is_object())
                .map(month_from_object)
                .collect()
        }
        Value::String(text) => match parse_loose(text) {
            Some(inner @ (Value::Object(_) | Value::Array(_))) if !is_line_salvage(&inner, text) => {
                months_of(&inner)
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn month_from_object(value: &Value) -> JournalMonth {
    let title = ["title", "month", "name"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    let items = ["items", "entries", "journal"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(rows_of)
        .unwrap_or_default();
    JournalMonth { title, items }
}

fn is_journal_row(value: &Value) -> bool {
    value.is_object()
        && ["account", "debit", "credit", "勘定科目", "借方", "貸方"]
            .iter()
            .any(|key| value.get(*key).is_some())
}

fn rows_of(value: &Value) -> Vec<JournalLine> {
    match value {
        Value::Array(rows) => rows.iter().filter_map(row_of).collect(),
        Value::Object(_) => row_of(value).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn row_of(value: &Value) -> Option<JournalLine> {
    let line: JournalLine = serde_json::from_value(value.clone()).ok()?;
    let has_content = !line.account.trim().is_empty() || line.debit.is_some() || line.credit.is_some();
    has_content.then_some(line)
}

/// Buckets flat journal rows by the month in their date; undated rows get an untitled bucket.
fn group_rows_by_month(rows: &[Value]) -> Vec<JournalMonth> {
    let mut buckets: Vec<JournalMonth> = Vec::new();
    for line in rows.iter().filter_map(row_of) {
        let title = month_number(&line.date).map(month_label).unwrap_or_default();
        match buckets.iter_mut().find(|bucket| bucket.title == title) {
            Some(bucket) => bucket.items.push(line),
            None => buckets.push(JournalMonth {
                title,
                items: vec![line],
            }),
        }
    }
    buckets
}

/// Merges duplicate years, keeping first-seen order.
fn finish(years: Vec<JournalYear>) -> JournalBook {
    let mut merged: Vec<JournalYear> = Vec::new();
    for entry in years {
        match merged.iter_mut().find(|existing| existing.year == entry.year) {
            Some(existing) => existing.months.extend(entry.months),
            None => merged.push(entry),
        }
    }
    JournalBook { years: merged }
}

/// Calendar month named by a title or date such as `4月`, `2020-04-30`, `April` or `4`.
pub(crate) fn month_number(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    let candidate = ISO_MONTH_RE
        .captures(trimmed)
        .or_else(|| KANJI_MONTH_RE.captures(trimmed))
        .and_then(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .or_else(|| trimmed.parse::<u32>().ok())
        .or_else(|| {
            let lower = trimmed.to_lowercase();
            ENGLISH_MONTHS
                .iter()
                .position(|name| lower.starts_with(name))
                .map(|idx| idx as u32 + 1)
        })?;
    (1..=12).contains(&candidate).then_some(candidate)
}

/// Guarantees twelve month buckets per year, April through March, each with an item list.
///
/// Months are placed by the month number found in their title; untitled or
/// unrecognized months fill slots by position.
pub fn ensure_year_months(mut book: JournalBook) -> JournalBook {
    for entry in &mut book.years {
        entry.months = complete_months(std::mem::take(&mut entry.months));
    }
    book
}

fn complete_months(months: Vec<JournalMonth>) -> Vec<JournalMonth> {
    let mut slots: Vec<JournalMonth> = FISCAL_MONTHS
        .iter()
        .map(|&month| JournalMonth {
            title: month_label(month),
            items: Vec::new(),
        })
        .collect();
    let mut filled = [false; 12];
    let mut unplaced = Vec::new();

    for (position, month) in months.into_iter().enumerate() {
        match month_number(&month.title).and_then(fiscal_month_index) {
            Some(slot) => {
                slots[slot].items.extend(month.items);
                filled[slot] = true;
            }
            None => unplaced.push((position, month)),
        }
    }

    for (position, month) in unplaced {
        let slot = if position < slots.len() && !filled[position] {
            position
        } else {
            filled
                .iter()
                .position(|taken| !taken)
                .unwrap_or(slots.len() - 1)
        };
        slots[slot].items.extend(month.items);
        filled[slot] = true;
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(account: &str, debit: Option<f64>, credit: Option<f64>) -> serde_json::Value {
        json!({"date": "2020-04-30", "account": account, "debit": debit, "credit": credit, "label": "売上計上"})
    }

    #[test]
    fn test_well_formed_journal_is_trusted() {
        let parsed = json!({
            "years": [{
                "year": 2020,
                "months": [{"title": "4月", "items": [line("売掛金", Some(100.0), None)]}]
            }]
        });
        let result = normalize_journal(Some(&parsed), &[2020], "");
        assert!(result.is_trusted());
        let book = result.into_value().unwrap();
        assert_eq!(book.years[0].year, 2020);
        assert_eq!(book.years[0].months[0].items[0].account, "売掛金");
    }

    #[test]
    fn test_missing_year_is_backfilled() {
        let parsed = json!({"years": [{"months": []}, {"months": []}]});
        let result = normalize_journal(Some(&parsed), &[2030, 2031], "");
        assert!(!result.is_trusted());
        let years: Vec<i32> = result.into_value().unwrap().years.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2030, 2031]);
    }

    #[test]
    fn test_primitive_years_get_empty_months() {
        let parsed = json!({"years": [2020, "2021"]});
        let book = normalize_journal(Some(&parsed), &[2020, 2021], "")
            .into_value()
            .unwrap();
        assert_eq!(book.years.len(), 2);
        assert!(book.years.iter().all(|y| y.months.is_empty()));
    }

    #[test]
    fn test_nested_json_string_is_unwrapped() {
        let inner = json!({"years": [{"year": 2022, "months": [{"title": "5月", "items": []}]}]});
        let parsed = json!({"years": [inner.to_string()]});
        let result = normalize_journal(Some(&parsed), &[2022], "");
        assert!(!result.is_trusted());
        let book = result.into_value().unwrap();
        assert_eq!(book.years[0].year, 2022);
        assert_eq!(book.years[0].months[0].title, "5月");
    }

    #[test]
    fn test_foreign_key_with_year_tags() {
        let parsed = json!({"journal": ["Year: 2020", "Year: 2021"]});
        let book = normalize_journal(Some(&parsed), &[], "").into_value().unwrap();
        let years: Vec<i32> = book.years.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2020, 2021]);
    }

    #[test]
    fn test_numeric_garbage_falls_back_to_raw_text() {
        let parsed = json!({"years": [1, 2, 3]});
        let raw = "Year: 2020 something\nYear: 2021 else";
        let result = normalize_journal(Some(&parsed), &[2020, 2021], raw);
        let book = result.into_value().unwrap();
        assert_eq!(book.years.len(), 2);
    }

    #[test]
    fn test_unrecoverable_text_fails() {
        let result = normalize_journal(None, &[2020], "the model refused");
        assert!(result.is_failed());
    }

    #[test]
    fn test_flat_rows_are_grouped_by_month() {
        let parsed = json!({"years": [{"year": 2020, "entries": [
            {"date": "2020-05-31", "account": "売掛金", "debit": 10},
            {"date": "2020-05-31", "account": "売上高", "credit": 10},
            {"date": "2021-01-31", "account": "給与", "debit": 5}
        ]}]});
        let book = ensure_year_months(normalize_journal(Some(&parsed), &[2020], "").into_value().unwrap());
        let months = &book.years[0].months;
        assert_eq!(months[1].title, "5月");
        assert_eq!(months[1].items.len(), 2);
        assert_eq!(months[9].title, "1月");
        assert_eq!(months[9].items.len(), 1);
    }

    #[test]
    fn test_ensure_year_months_fills_and_orders() {
        let book = JournalBook {
            years: vec![JournalYear {
                year: 2020,
                months: vec![
                    JournalMonth {
                        title: "2021年3月".to_string(),
                        items: vec![JournalLine::default()],
                    },
                    JournalMonth {
                        title: "April".to_string(),
                        items: vec![JournalLine::default(), JournalLine::default()],
                    },
                    JournalMonth {
                        title: "???".to_string(),
                        items: vec![JournalLine::default()],
                    },
                ],
            }],
        };
        let book = ensure_year_months(book);
        let months = &book.years[0].months;
        let titles: Vec<&str> = months.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["4月", "5月", "6月", "7月", "8月", "9月", "10月", "11月", "12月", "1月", "2月", "3月"]
        );
        assert_eq!(months[0].items.len(), 2);
        assert_eq!(months[11].items.len(), 1);
        // unrecognized third month lands in its positional slot (June)
        assert_eq!(months[2].items.len(), 1);
    }

    #[test]
    fn test_month_number_formats() {
        assert_eq!(month_number("4月"), Some(4));
        assert_eq!(month_number("12月"), Some(12));
        assert_eq!(month_number("2020-11-30"), Some(11));
        assert_eq!(month_number("2021年2月"), Some(2));
        assert_eq!(month_number("September"), Some(9));
        assert_eq!(month_number("7"), Some(7));
        assert_eq!(month_number("13"), None);
        assert_eq!(month_number(""), None);
    }
}
