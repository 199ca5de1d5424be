//! Date windows for period-bound fetches and digests.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;
use tracing::debug;

use crate::fetch::Record;

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),
    #[error("window start {start} is after end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
    #[error("day count must be at least 1")]
    ZeroDays,
    #[error("{days} days before {today} is out of the supported date range")]
    OutOfRange { days: u32, today: NaiveDate },
}

/// Inclusive range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// The `days` days before `today`, through `today`.
    pub fn last_days(days: u32, today: NaiveDate) -> Result<Self, WindowError> {
        if days == 0 {
            return Err(WindowError::ZeroDays);
        }
        let start = today
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or(WindowError::OutOfRange { days, today })?;
        Self::new(start, today)
    }

    /// A whole calendar month.
    pub fn month_of(year: i32, month: u32) -> Result<Self, WindowError> {
        let invalid = || WindowError::InvalidMonth(format!("{:04}-{:02}", year, month));
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(invalid)?;
        Self::new(start, next_month - Duration::days(1))
    }

    /// Parse `YYYY-MM`.
    pub fn parse_month(value: &str) -> Result<Self, WindowError> {
        let invalid = || WindowError::InvalidMonth(value.to_string());
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::month_of(year, month).map_err(|_| invalid())
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// First instant of the window.
    pub fn since(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }

    /// Last whole second of the window.
    pub fn until(&self) -> DateTime<Utc> {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Utc.from_utc_datetime(&self.end.and_time(end_of_day))
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.contains_date(timestamp.date_naive())
    }

    /// `2024-03-01_to_2024-03-31`, used in output file names.
    pub fn label(&self) -> String {
        format!("{}_to_{}", self.start, self.end)
    }

    /// Keep records whose timestamp at `date_pointer` falls in the window.
    /// Records with a missing or unparseable timestamp are dropped.
    pub fn retain_records(&self, records: Vec<Record>, date_pointer: &str) -> Vec<Record> {
        records
            .into_iter()
            .filter(|record| match record.str_field(date_pointer).and_then(parse_timestamp) {
                Some(timestamp) => self.contains(timestamp),
                None => {
                    debug!(
                        "record {} has no parseable date at '{}'",
                        record.id, date_pointer
                    );
                    false
                }
            })
            .collect()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Parse the timestamp shapes providers emit: RFC 3339, naive ISO date-times
/// (taken as UTC) and bare dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

/// Today's date in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
