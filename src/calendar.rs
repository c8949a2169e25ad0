//! Civil dates, quarter arithmetic, and backfill segmentation.
//!
//! The EDGAR archives are organized by calendar quarter, with one quarterly
//! master index per quarter and one daily index per trading day. Everything in
//! this crate that needs to reason about "which artifacts should exist for a
//! date range" goes through this module:
//!
//! - [`Date`] wraps `chrono::NaiveDate` with the quarter-centric queries the
//!   repository layout needs (quarter number, enclosing quarter bounds,
//!   inclusive day differences).
//! - [`PeriodType`] tags an artifact as daily (`D`) or quarterly (`Q`).
//! - [`DatePeriod`] is a typed, inclusive date interval.
//! - [`Date::backfill`] decomposes an arbitrary range into the minimal
//!   sequence of day/quarter periods that exactly covers it.
//!
//! # Examples
//!
//! ```rust
//! use mirrorkit::{Date, PeriodType};
//!
//! # fn main() -> mirrorkit::Result<()> {
//! let d = Date::parse("2020-03-07")?;
//! assert_eq!(d.quarter(), 1);
//!
//! let (qbeg, qend) = d.quarter_dates();
//! assert_eq!(qbeg.to_string(), "2020-01-01");
//! assert_eq!(qend.to_string(), "2020-03-31");
//!
//! let segments: Vec<_> = Date::parse("2020-12-31")?
//!     .backfill(Date::parse("2020-01-01")?)
//!     .collect();
//! assert_eq!(segments.len(), 4);
//! assert!(segments.iter().all(|p| p.period_type == PeriodType::Quarter));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{MirrorError, Result};
use crate::format::Template;

/// Earliest year the calendar accepts; EDGAR itself starts in 1994, but the
/// calendar rules are valid from the 20th century on.
pub const MIN_YEAR: i32 = 1900;

/// Quarter start months, with 13 standing in for January of the next year.
const QUARTER_START_MONTHS: [u32; 5] = [1, 4, 7, 10, 13];

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    // Only called with month/day combinations that exist for every year.
    NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
}

/// Whether a repository artifact covers a single day or a whole quarter.
///
/// The string forms are the single characters `"D"` and `"Q"`, which also
/// appear as the top-level directories of the mirrored index tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    #[serde(rename = "D")]
    Day,
    #[serde(rename = "Q")]
    Quarter,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Day => "D",
            PeriodType::Quarter => "Q",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "D" => Ok(PeriodType::Day),
            "Q" => Ok(PeriodType::Quarter),
            other => Err(MirrorError::InvalidPath(format!(
                "unknown period type {other:?}"
            ))),
        }
    }
}

/// A civil (Gregorian) date, total-ordered, year 1900 or later.
///
/// `Date` is a small value type; arithmetic such as [`Date::add_days`] always
/// returns a new value and never mutates a shared alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(NaiveDate);

impl Date {
    /// Parses a `YYYY-MM-DD` string.
    ///
    /// # Errors
    ///
    /// `BadDate` for any other shape, for impossible dates, and for years
    /// before [`MIN_YEAR`].
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 10 {
            return Err(MirrorError::BadDate(s.to_string()));
        }
        let inner = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| MirrorError::BadDate(s.to_string()))?;
        if inner.year() < MIN_YEAR {
            return Err(MirrorError::BadDate(s.to_string()));
        }
        Ok(Date(inner))
    }

    /// Builds a date from numeric components.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
        if year < MIN_YEAR {
            return Err(MirrorError::BadDate(format!("{year:04}-{month:02}-{day:02}")));
        }
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Date)
            .ok_or_else(|| MirrorError::BadDate(format!("{year:04}-{month:02}-{day:02}")))
    }

    /// Today in local time.
    pub fn today() -> Self {
        Date(Local::now().date_naive())
    }

    /// Yesterday in local time; the natural upper bound for a mirror sync,
    /// since the current day's index is still being appended to upstream.
    pub fn yesterday() -> Self {
        let today = Local::now().date_naive();
        Date(today.pred_opt().unwrap_or(today))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// ISO weekday: 1 = Monday .. 7 = Sunday.
    pub fn iso_weekday(&self) -> u32 {
        self.0.weekday().number_from_monday()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.0.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// The quarter number, 1..=4.
    pub fn quarter(&self) -> u32 {
        (self.0.month() - 1) / 3 + 1
    }

    /// Returns a new date `days` later (or earlier for negative `days`).
    pub fn add_days(&self, days: i64) -> Self {
        Date(self.0 + Duration::days(days))
    }

    /// The number of days from `from` to `self`, counting the start date:
    /// `d.diff_days(d) == 1`.
    pub fn diff_days(&self, from: Date) -> i64 {
        (self.0 - from.0).num_days() + 1
    }

    /// The difference of quarter numbers, `self.quarter() - from.quarter()`.
    ///
    /// This is not a calendar-quarters-elapsed count: for dates in different
    /// years the value says nothing useful, and [`Date::backfill`] (which is
    /// built on it) only supports ranges within one calendar year.
    pub fn diff_quarters(&self, from: Date) -> i32 {
        self.quarter() as i32 - from.quarter() as i32
    }

    /// First and last day of the quarter enclosing this date.
    pub fn quarter_dates(&self) -> (Date, Date) {
        let mut begin = self.0;
        for m in QUARTER_START_MONTHS {
            let qdate = ymd(self.0.year() + (m / 13) as i32, if m == 13 { 1 } else { m }, 1);
            if self.0 < qdate {
                return (Date(begin), Date(qdate - Duration::days(1)));
            }
            begin = qdate;
        }
        unreachable!("month 13 bounds every date")
    }

    /// The `which`-th occurrence of `weekday` in the given month; `which = 5`
    /// means the last occurrence (the 5th when it exists, otherwise the 4th).
    pub fn nth_weekday(year: i32, month: u32, weekday: Weekday, which: u8) -> Result<Self> {
        let picked = NaiveDate::from_weekday_of_month_opt(year, month, weekday, which).or_else(
            || {
                if which == 5 {
                    NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4)
                } else {
                    None
                }
            },
        );
        picked.map(Date).ok_or_else(|| {
            MirrorError::BadDate(format!("no {weekday} #{which} in {year:04}-{month:02}"))
        })
    }

    /// Renders this date through a macro template; see [`Template`] for the
    /// recognized macros. `extras` supplies values for user macros by name.
    pub fn format(
        &self,
        spec: &str,
        period: Option<PeriodType>,
        extras: &[(&str, &str)],
    ) -> Result<String> {
        let extras: HashMap<String, String> = extras
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Template::compile(spec).render(period, *self, &extras)
    }

    /// Decomposes `[from, self]` (inclusive both ends) into the minimal
    /// covering sequence of day/quarter periods.
    ///
    /// Quarter segments coincide exactly with calendar quarters; adjacent
    /// segments are contiguous and their union is the full range. An empty
    /// sequence is produced when `from` is after `self`.
    ///
    /// Ranges crossing a calendar-year boundary are not supported; the
    /// quarter count underlying the segmentation is a same-year difference.
    pub fn backfill(&self, from: Date) -> Backfill {
        let total = if self.diff_days(from) <= 0 {
            0
        } else {
            match self.diff_quarters(from) {
                0 => 1,
                dq if dq > 0 => dq + 1,
                _ => 2,
            }
        };
        Backfill {
            to: *self,
            cursor: from,
            seg: 0,
            total,
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for Date {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        Date::parse(s)
    }
}

impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Date::parse(&s).map_err(de::Error::custom)
    }
}

/// Lazy iterator over backfill segments, produced by [`Date::backfill`].
#[derive(Debug, Clone)]
pub struct Backfill {
    to: Date,
    cursor: Date,
    seg: i32,
    total: i32,
}

impl Iterator for Backfill {
    type Item = DatePeriod;

    fn next(&mut self) -> Option<DatePeriod> {
        if self.seg >= self.total {
            return None;
        }
        let is_first = self.seg == 0;
        let is_last = self.seg == self.total - 1;
        let start = self.cursor;
        let (qbeg, qend) = start.quarter_dates();
        let end = if is_last { self.to } else { qend };
        let period_type = if (!is_first || start == qbeg) && (!is_last || end == qend) {
            PeriodType::Quarter
        } else {
            PeriodType::Day
        };
        self.seg += 1;
        self.cursor = end.add_days(1);
        Some(DatePeriod {
            period_type,
            start,
            end,
        })
    }
}

/// A typed, inclusive date interval: `(period_type, start, end)` with
/// `start <= end`.
///
/// Serializes as `"<T>,YYYY-MM-DD,YYYY-MM-DD"` with `T` one of `D`/`Q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePeriod {
    pub period_type: PeriodType,
    pub start: Date,
    pub end: Date,
}

impl DatePeriod {
    pub fn new(period_type: PeriodType, start: Date, end: Date) -> Result<Self> {
        if start > end {
            return Err(MirrorError::InvalidPeriod(format!(
                "{start} is after {end}"
            )));
        }
        Ok(DatePeriod {
            period_type,
            start,
            end,
        })
    }

    /// Number of days covered, counting both ends.
    pub fn num_days(&self) -> i64 {
        self.end.diff_days(self.start)
    }

    /// Snaps the period to the quarter enclosing its start date and retypes
    /// it as quarterly. Idempotent for periods that already are a quarter.
    ///
    /// # Errors
    ///
    /// `PeriodTooWide` when the end date lies beyond that quarter.
    pub fn expand_to_quarter(self) -> Result<Self> {
        let (qbeg, qend) = self.start.quarter_dates();
        if self.end > qend {
            return Err(MirrorError::PeriodTooWide {
                end: self.end.to_string(),
                quarter_end: qend.to_string(),
            });
        }
        Ok(DatePeriod {
            period_type: PeriodType::Quarter,
            start: qbeg,
            end: qend,
        })
    }
}

impl fmt::Display for DatePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.period_type, self.start, self.end)
    }
}

impl FromStr for DatePeriod {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ',');
        let (t, b, e) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(b), Some(e)) => (t, b, e),
            _ => return Err(MirrorError::InvalidPeriod(s.to_string())),
        };
        DatePeriod::new(t.parse()?, Date::parse(b)?, Date::parse(e)?)
    }
}
