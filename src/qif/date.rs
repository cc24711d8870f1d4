use std::str::FromStr;

use chrono::NaiveDate;

use super::QifError;

/// Order of the day and month fields in non-ISO QIF dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateOrder {
    #[default]
    MonthDayYear,
    DayMonthYear,
}

impl DateOrder {
    pub(crate) fn format(&self) -> &'static str {
        match self {
            DateOrder::MonthDayYear => "%m/%d/%Y",
            DateOrder::DayMonthYear => "%d/%m/%Y",
        }
    }
}

impl FromStr for DateOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mdy" | "month-day-year" => Ok(DateOrder::MonthDayYear),
            "dmy" | "day-month-year" => Ok(DateOrder::DayMonthYear),
            other => Err(format!("unknown date order {other:?}, expected \"mdy\" or \"dmy\"")),
        }
    }
}

/// Parses the date variants Quicken and friends write: `2014-01-02`, `1/2/2014`, `01/02/14`,
/// `1/ 2'14`, `01.02.2014`. Two-digit years after an apostrophe are in the 2000s, otherwise years
/// below 70 are too.
pub fn parse_date(raw: &str, order: DateOrder) -> Result<NaiveDate, QifError> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }

    let err = || QifError::DateFormat(raw.to_string());

    let apostrophe = trimmed.contains('\'');
    let fields: Vec<&str> = trimmed
        .split(|c: char| matches!(c, '/' | '.' | '-' | '\''))
        .map(str::trim)
        .collect();
    if fields.len() != 3 || fields.iter().any(|field| field.is_empty()) {
        return Err(err());
    }

    let numbers = fields
        .iter()
        .map(|field| field.parse::<u32>())
        .collect::<Result<Vec<u32>, _>>()
        .map_err(|_| err())?;

    // A four digit leading field can only be a year.
    if fields[0].len() == 4 {
        return NaiveDate::from_ymd_opt(numbers[0] as i32, numbers[1], numbers[2]).ok_or_else(err);
    }

    let (month, day) = match order {
        DateOrder::MonthDayYear => (numbers[0], numbers[1]),
        DateOrder::DayMonthYear => (numbers[1], numbers[0]),
    };
    let year = match fields[2].len() {
        4 => numbers[2] as i32,
        1 | 2 if apostrophe || numbers[2] < 70 => 2000 + numbers[2] as i32,
        1 | 2 => 1900 + numbers[2] as i32,
        _ => return Err(err()),
    };

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(err)
}
