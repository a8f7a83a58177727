//! Calendar month windows for the monthly sales breakdown.

use crate::domain::{IntelError, MonthWindow};
use chrono::{Datelike, Months, NaiveDate};

fn parse_year_month(input: &str) -> Result<(i32, u32), IntelError> {
    let bytes = input.as_bytes();
    let shaped = bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit);
    if !shaped {
        return Err(IntelError::validation("month must use YYYY-MM format"));
    }
    let year = input[..4]
        .parse::<i32>()
        .map_err(|_| IntelError::validation("month must use YYYY-MM format"))?;
    let month = input[5..]
        .parse::<u32>()
        .map_err(|_| IntelError::validation("month must use YYYY-MM format"))?;
    if !(1..=12).contains(&month) {
        return Err(IntelError::validation("month must be a valid YYYY-MM value"));
    }
    Ok((year, month))
}

/// First and last day of a month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((start, end))
}

/// Resolve a `YYYY-MM` input, or the month before `today` when absent.
///
/// `None` and the empty string count as absent. Whitespace-only input is
/// malformed.
///
/// # Errors
///
/// Returns `IntelError::Validation` for a malformed or out-of-range month.
pub fn resolve_month_window(input: Option<&str>, today: NaiveDate) -> Result<MonthWindow, IntelError> {
    let (year, month) = match input.filter(|s| !s.is_empty()) {
        Some(text) => parse_year_month(text.trim())?,
        None => {
            let previous = today
                .with_day(1)
                .and_then(|first| first.checked_sub_months(Months::new(1)))
                .ok_or_else(|| IntelError::validation("cannot compute the previous month"))?;
            (previous.year(), previous.month())
        }
    };
    let (start_date, end_date) = month_bounds(year, month)
        .ok_or_else(|| IntelError::validation("month must be a valid YYYY-MM value"))?;
    Ok(MonthWindow {
        month: format!("{:04}-{:02}", year, month),
        start_date,
        end_date,
    })
}
