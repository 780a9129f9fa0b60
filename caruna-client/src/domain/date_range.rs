use std::fmt;

use time::{macros::format_description, Date, OffsetDateTime};

/// Longest span (in days) a single run may request.
pub const MAX_RANGE_DAYS: i64 = 1850;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("incorrect start date format: '{0}'")]
    InvalidStart(String),
    #[error("incorrect end date format: '{0}'")]
    InvalidEnd(String),
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: Date, end: Date },
    #[error("time range too large: {days} days (limit {})", MAX_RANGE_DAYS)]
    TooLarge { days: i64 },
}

/// Inclusive calendar range `[start, end]` for one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: Date,
    end: Date,
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_iso_date(input: &str) -> Result<Date, time::error::Parse> {
    Date::parse(input.trim(), format_description!("[year]-[month]-[day]"))
}

/// Today's calendar date in the local timezone, falling back to UTC when the
/// local offset cannot be determined.
pub fn local_today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Result<Self, DateRangeError> {
        if end < start {
            return Err(DateRangeError::EndBeforeStart { start, end });
        }

        let days = (end - start).whole_days();
        if days > MAX_RANGE_DAYS {
            return Err(DateRangeError::TooLarge { days });
        }

        Ok(Self { start, end })
    }

    /// Resolve optional CLI arguments against `today`.
    ///
    /// A missing start defaults to the day before `today`, a missing end to
    /// `today` itself.
    pub fn resolve(
        start: Option<&str>,
        end: Option<&str>,
        today: Date,
    ) -> Result<Self, DateRangeError> {
        let start = match start {
            Some(s) => parse_iso_date(s).map_err(|_| DateRangeError::InvalidStart(s.to_string()))?,
            None => today.previous_day().unwrap_or(today),
        };
        let end = match end {
            Some(s) => parse_iso_date(s).map_err(|_| DateRangeError::InvalidEnd(s.to_string()))?,
            None => today,
        };

        Self::new(start, end)
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    pub fn span_days(&self) -> i64 {
        (self.end - self.start).whole_days()
    }

    /// Every calendar day in the range, end included.
    pub fn days(&self) -> impl Iterator<Item = Date> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |d| d.next_day().filter(|n| *n <= end))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
