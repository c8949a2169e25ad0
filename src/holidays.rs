//! Observed U.S. federal holidays, one set per calendar year.
//!
//! The SEC publishes no daily index for days the markets observe a federal
//! holiday, so the missing-artifact scan must know exactly which weekdays to
//! skip. Each year has ten holidays: four on fixed dates and six floating
//! ones pinned to a weekday occurrence within a month (see
//! <https://www.opm.gov/policy-data-oversight/pay-leave/federal-holidays/>).
//!
//! A holiday falling on a Saturday is observed the Friday before; one falling
//! on a Sunday is observed the Monday after. The sets returned by
//! [`UsHolidays::for_year`] are post-rollover and memoized per year.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use chrono::Weekday;

use crate::calendar::Date;

const FIXED: [(u32, u32, &str); 4] = [
    (1, 1, "New Year's Day"),
    (7, 4, "Independence Day"),
    (11, 11, "Veterans Day"),
    (12, 25, "Christmas Day"),
];

/// `(month, weekday, which)` with `which = 5` meaning the last occurrence.
const FLOATING: [(u32, Weekday, u8, &str); 6] = [
    (1, Weekday::Mon, 3, "Birthday of Martin Luther King, Jr."),
    (2, Weekday::Mon, 3, "Washington's Birthday"),
    (5, Weekday::Mon, 5, "Memorial Day"),
    (9, Weekday::Mon, 1, "Labor Day"),
    (10, Weekday::Mon, 2, "Columbus Day"),
    (11, Weekday::Thu, 4, "Thanksgiving Day"),
];

static CACHE: LazyLock<Mutex<HashMap<i32, Arc<UsHolidays>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// The observed federal holidays of one calendar year.
///
/// Membership and name lookups are O(1). Note that an observed date can land
/// in the neighboring year: January 1 on a Saturday is observed December 31.
#[derive(Debug)]
pub struct UsHolidays {
    year: i32,
    names: HashMap<Date, &'static str>,
}

impl UsHolidays {
    /// The holiday set for `year`, built on first use and shared afterwards.
    pub fn for_year(year: i32) -> Arc<UsHolidays> {
        let mut cache = CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            cache
                .entry(year)
                .or_insert_with(|| Arc::new(UsHolidays::build(year))),
        )
    }

    fn build(year: i32) -> UsHolidays {
        let mut names: HashMap<Date, &'static str> = HashMap::with_capacity(10);

        for (month, day, name) in FIXED {
            if let Ok(date) = Date::from_ymd(year, month, day) {
                names.insert(Self::observe(date), name);
            }
        }
        for (month, weekday, which, name) in FLOATING {
            if let Ok(date) = Date::nth_weekday(year, month, weekday, which) {
                names.insert(Self::observe(date), name);
            }
        }

        UsHolidays { year, names }
    }

    /// Saturday rolls back to Friday, Sunday forward to Monday.
    fn observe(date: Date) -> Date {
        match date.iso_weekday() {
            6 => date.add_days(-1),
            7 => date.add_days(1),
            _ => date,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether `date` is an observed holiday of this set.
    pub fn contains(&self, date: Date) -> bool {
        self.names.contains_key(&date)
    }

    /// The designated name of the holiday observed on `date`, if any.
    pub fn name_of(&self, date: Date) -> Option<&'static str> {
        self.names.get(&date).copied()
    }

    /// Iterates over the observed dates in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = Date> + '_ {
        self.names.keys().copied()
    }
}
