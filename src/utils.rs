use chrono::NaiveDate;

/// Calendar months of a Japanese fiscal year, April through March.
pub const FISCAL_MONTHS: [u32; 12] = [4, 5, 6, 7, 8, 9, 10, 11, 12, 1, 2, 3];

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Calendar year in which `month` falls for the fiscal year starting in April of `fiscal_year`.
pub fn calendar_year_for(fiscal_year: i32, month: u32) -> i32 {
    if month >= FISCAL_MONTHS[0] {
        fiscal_year
    } else {
        fiscal_year + 1
    }
}

/// Japanese month label, e.g. `4月`.
pub fn month_label(month: u32) -> String {
    format!("{}月", month)
}

/// Returns the 0-based slot of a calendar month within the April-start fiscal year.
///
/// # Examples
/// - April = 0, December = 8, January = 9, March = 11
pub fn fiscal_month_index(calendar_month: u32) -> Option<usize> {
    FISCAL_MONTHS.iter().position(|&m| m == calendar_month)
}

/// Month-end date string (`YYYY-MM-DD`) for a fiscal month.
pub fn fiscal_month_end(fiscal_year: i32, month: u32) -> String {
    let year = calendar_year_for(fiscal_year, month);
    match last_day_of_month(year, month) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => format!("{:04}-{:02}", year, month),
    }
}

/// Replaces characters that are unsafe in file names.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();
    if sanitized.is_empty() {
        "response".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2023, 2),
            NaiveDate::from_ymd_opt(2023, 2, 28)
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            last_day_of_month(2023, 12),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
    }

    #[test]
    fn test_fiscal_month_index() {
        assert_eq!(fiscal_month_index(4), Some(0));
        assert_eq!(fiscal_month_index(12), Some(8));
        assert_eq!(fiscal_month_index(1), Some(9));
        assert_eq!(fiscal_month_index(3), Some(11));
        assert_eq!(fiscal_month_index(13), None);
    }

    #[test]
    fn test_fiscal_month_end_crosses_calendar_year() {
        assert_eq!(fiscal_month_end(2020, 4), "2020-04-30");
        assert_eq!(fiscal_month_end(2020, 2), "2021-02-28");
        assert_eq!(fiscal_month_end(2023, 2), "2024-02-29");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("JE 2020/2021:raw"), "JE_2020_2021_raw");
        assert_eq!(sanitize_filename(""), "response");
    }
}
