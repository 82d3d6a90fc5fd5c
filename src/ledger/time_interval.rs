//! Calendar units and clamped date arithmetic shared by every recurrence.

use std::{fmt, str::FromStr};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::errors::{ObligationError, Result};

/// Enumerates the supported recurrence cadences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Yearly,
    ];

    /// Singular unit name, e.g. "Week" for [`Frequency::Weekly`].
    pub fn unit_label(self) -> &'static str {
        match self {
            Frequency::Daily => "Day",
            Frequency::Weekly => "Week",
            Frequency::Monthly => "Month",
            Frequency::Yearly => "Year",
        }
    }

    /// Human readable cadence such as "Monthly" or "Every 2 Weeks".
    pub fn label(self, interval: u32) -> String {
        match interval {
            1 => self.to_string(),
            n => format!("Every {} {}s", n, self.unit_label()),
        }
    }

    /// Moves `from` forward by `interval` units.
    ///
    /// Month and year steps land on `anchor_day` when the target month has it, and on the
    /// month's last day otherwise.
    pub fn step_forward(self, from: NaiveDate, interval: u32, anchor_day: u32) -> Result<NaiveDate> {
        self.shift(from, i64::from(interval), anchor_day)
    }

    /// Moves `from` back by `interval` units using the same clamping rules.
    pub fn step_back(self, from: NaiveDate, interval: u32, anchor_day: u32) -> Result<NaiveDate> {
        self.shift(from, -i64::from(interval), anchor_day)
    }

    /// Moves `from` by `units` of this frequency; negative values move backwards.
    ///
    /// Fails instead of saturating when the result falls outside chrono's date range.
    pub fn shift(self, from: NaiveDate, units: i64, anchor_day: u32) -> Result<NaiveDate> {
        let moved = match self {
            Frequency::Daily => Duration::try_days(units).and_then(|d| from.checked_add_signed(d)),
            Frequency::Weekly => units
                .checked_mul(7)
                .and_then(Duration::try_days)
                .and_then(|d| from.checked_add_signed(d)),
            Frequency::Monthly => shift_month(from, units, anchor_day),
            Frequency::Yearly => units
                .checked_mul(12)
                .and_then(|months| shift_month(from, months, anchor_day)),
        };
        moved.ok_or_else(|| {
            ObligationError::Validation(format!(
                "moving {from} by {units} {} steps leaves the supported date range",
                self.unit_label().to_lowercase()
            ))
        })
    }

    /// Fixed period length in days for the linear units.
    pub(crate) fn linear_days(self, interval: u32) -> Option<i64> {
        match self {
            Frequency::Daily => Some(interval as i64),
            Frequency::Weekly => Some(interval as i64 * 7),
            Frequency::Monthly | Frequency::Yearly => None,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
            Frequency::Yearly => "Yearly",
        };
        f.write_str(label)
    }
}

impl FromStr for Frequency {
    type Err = ObligationError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|frequency| frequency.to_string() == value.trim())
            .ok_or_else(|| ObligationError::UnsupportedFrequency(value.to_string()))
    }
}

/// Defines a half-open `[start, end)` reporting window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(ObligationError::Validation(
                "date window end must be after start".into(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

fn shift_month(date: NaiveDate, months: i64, anchor_day: u32) -> Option<NaiveDate> {
    let index = (i64::from(date.year()) * 12 + i64::from(date.month0())).checked_add(months)?;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = index.rem_euclid(12) as u32 + 1;
    let day = anchor_day.clamp(1, 31).min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Number of days in `month` of `year`, accounting for leap years.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap_year(year) => 29,
        _ => 28,
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
