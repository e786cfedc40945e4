//! Date-plus-granularity tokens used by statistics queries.
//!
//! A token's shape picks its granularity: `2021` is a year, `2021-03` a month,
//! `2021-W09` an ISO week, `2021-03-04` a day and `2021-03-04T15` an hour.
//! All times are UTC.

use chrono::{DateTime, Months, NaiveDate, TimeDelta, Utc, Weekday};
use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::IndexError;

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})$").unwrap());
static MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static WEEK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-W(\d{2})$").unwrap());
static DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());
static HOUR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})T(\d{2})$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    /// PostgreSQL `to_char` pattern producing bucket labels for this granularity.
    pub fn sql_label_format(&self) -> &'static str {
        match self {
            Granularity::Hour => r#"YYYY-MM-DD"T"HH24"#,
            Granularity::Day => "YYYY-MM-DD",
            Granularity::Week => r#"IYYY-"W"IW"#,
            Granularity::Month => "YYYY-MM",
            Granularity::Year => "YYYY",
        }
    }

    /// The label of the bucket containing `at`; matches what
    /// [`sql_label_format`](Self::sql_label_format) renders in the engine.
    pub fn label(&self, at: DateTime<Utc>) -> String {
        let format = match self {
            Granularity::Hour => "%Y-%m-%dT%H",
            Granularity::Day => "%Y-%m-%d",
            Granularity::Week => "%G-W%V",
            Granularity::Month => "%Y-%m",
            Granularity::Year => "%Y",
        };
        at.format(format).to_string()
    }
}

/// A parsed statistics token: where the range starts and how wide each bucket is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpec {
    pub start: DateTime<Utc>,
    pub granularity: Granularity,
}

impl TimeSpec {
    pub fn parse(token: &str) -> Result<Self, IndexError> {
        let invalid = || IndexError::InvalidTimeSpec(token.to_string());

        let (date, hour, granularity) = if let Some(caps) = HOUR.captures(token) {
            let date = ymd(&caps[1], &caps[2], &caps[3]).ok_or_else(invalid)?;
            (date, number(&caps[4]).ok_or_else(invalid)?, Granularity::Hour)
        } else if let Some(caps) = DAY.captures(token) {
            let date = ymd(&caps[1], &caps[2], &caps[3]).ok_or_else(invalid)?;
            (date, 0, Granularity::Day)
        } else if let Some(caps) = WEEK.captures(token) {
            let year = number(&caps[1]).ok_or_else(invalid)?;
            let week = number(&caps[2]).ok_or_else(invalid)?;
            let date = NaiveDate::from_isoywd_opt(year as i32, week, Weekday::Mon)
                .ok_or_else(invalid)?;
            (date, 0, Granularity::Week)
        } else if let Some(caps) = MONTH.captures(token) {
            let date = ymd(&caps[1], &caps[2], "01").ok_or_else(invalid)?;
            (date, 0, Granularity::Month)
        } else if let Some(caps) = YEAR.captures(token) {
            let date = ymd(&caps[1], "01", "01").ok_or_else(invalid)?;
            (date, 0, Granularity::Year)
        } else {
            return Err(invalid());
        };

        let start = date.and_hms_opt(hour, 0, 0).ok_or_else(invalid)?.and_utc();
        Ok(Self { start, granularity })
    }

    /// The instant `n` granularity units after the start. Month and year steps follow
    /// the calendar.
    pub fn end_after(&self, n: u32) -> Result<DateTime<Utc>, IndexError> {
        let overflow =
            || IndexError::InvalidTimeSpec(format!("range of {} units overflows", n));
        let n64 = i64::from(n);

        let end = match self.granularity {
            Granularity::Hour => TimeDelta::try_hours(n64)
                .and_then(|delta| self.start.checked_add_signed(delta)),
            Granularity::Day => {
                TimeDelta::try_days(n64).and_then(|delta| self.start.checked_add_signed(delta))
            }
            Granularity::Week => TimeDelta::try_weeks(n64)
                .and_then(|delta| self.start.checked_add_signed(delta)),
            Granularity::Month => self.start.checked_add_months(Months::new(n)),
            Granularity::Year => n
                .checked_mul(12)
                .and_then(|months| self.start.checked_add_months(Months::new(months))),
        };

        end.ok_or_else(overflow)
    }

    pub fn label(&self, at: DateTime<Utc>) -> String {
        self.granularity.label(at)
    }
}

fn number(digits: &str) -> Option<u32> {
    digits.parse().ok()
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(number(year)? as i32, number(month)?, number(day)?)
}
