//! Calendar-month keys for the record cache.
//!
//! A `PeriodKey` is a (year, month) pair with a zero-based month, so
//! January is `0` and December is `11`. Its `Display` form (`"2024-2"` for
//! March 2024) is the stable textual key.

use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Expense, Income};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Month out of range: {0} (expected 0-11)")]
    MonthOutOfRange(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawPeriodKey")]
pub struct PeriodKey {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct RawPeriodKey {
    year: i32,
    month: u32,
}

impl TryFrom<RawPeriodKey> for PeriodKey {
    type Error = PeriodError;

    fn try_from(raw: RawPeriodKey) -> Result<Self, Self::Error> {
        PeriodKey::new(raw.month, raw.year)
    }
}

impl PeriodKey {
    /// Derive the key for a zero-based `month` of `year`.
    pub fn new(month: u32, year: i32) -> Result<Self, PeriodError> {
        if month > 11 {
            return Err(PeriodError::MonthOutOfRange(month));
        }
        Ok(Self { year, month })
    }

    /// The current local calendar month
    pub fn current() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    /// Fill in whichever of month/year is missing from the current month.
    pub fn resolve(month: Option<u32>, year: Option<i32>) -> Result<Self, PeriodError> {
        let now = Self::current();
        Self::new(month.unwrap_or(now.month), year.unwrap_or(now.year))
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month0(),
        }
    }

    /// Route a backend date string to its period.
    ///
    /// Accepts `YYYY-MM-DD` and RFC 3339 timestamps. Timestamps are taken
    /// at their own offset, so `2024-03-31T23:30:00-03:00` stays in March.
    pub fn from_date_str(date: &str) -> Option<Self> {
        let date = date.trim();
        if let Ok(d) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return Some(Self::from_date(d));
        }
        DateTime::parse_from_rfc3339(date)
            .ok()
            .map(|dt| Self::from_date(dt.date_naive()))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Zero-based month
    pub fn month(&self) -> u32 {
        self.month
    }

    /// One-based month, as the backend and the command line expect it
    pub fn month_number(&self) -> u32 {
        self.month + 1
    }

    pub fn succ(&self) -> Self {
        if self.month == 11 {
            Self { year: self.year + 1, month: 0 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn pred(&self) -> Self {
        if self.month == 0 {
            Self { year: self.year - 1, month: 11 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    /// Human readable form, e.g. "March 2024"
    pub fn label(&self) -> String {
        format!("{} {}", MONTH_NAMES[self.month as usize], self.year)
    }

    pub fn contains(&self, date: &str) -> bool {
        Self::from_date_str(date) == Some(*self)
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.year, self.month)
    }
}

/// Anything that can be placed on the calendar.
pub trait Dated {
    fn date_str(&self) -> Option<&str>;
}

impl Dated for Expense {
    fn date_str(&self) -> Option<&str> {
        Some(self.date.as_str())
    }
}

impl Dated for Income {
    fn date_str(&self) -> Option<&str> {
        self.date.as_deref()
    }
}

/// Keep only the records dated inside `key`, preserving order.
///
/// Used when the backend returns everything and the month has to be cut
/// out client-side. Records without a parseable date are dropped.
pub fn filter_by_period<T: Dated>(records: Vec<T>, key: PeriodKey) -> Vec<T> {
    records
        .into_iter()
        .filter(|r| r.date_str().map(|d| key.contains(d)).unwrap_or(false))
        .collect()
}
