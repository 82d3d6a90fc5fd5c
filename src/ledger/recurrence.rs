//! The recurrence state machine used by obligations and budget cycles alike.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::time_interval::{DateWindow, Frequency};
use crate::core::errors::{ObligationError, Result};

/// Frequency, interval and trigger-date state for one recurring schedule.
///
/// Serialized as `{frequency, interval, startDate, nextTriggerDate, endDate?}` with ISO-8601
/// dates. Deserialization runs the same validation as [`RecurrenceRule::restore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RuleRecord")]
pub struct RecurrenceRule {
    frequency: Frequency,
    interval: u32,
    start_date: NaiveDate,
    next_trigger_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<NaiveDate>,
}

/// Request shape used by API layers to describe a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub frequency: String,
    pub interval: i64,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    /// Creates a rule whose first trigger is its start date.
    pub fn new(
        frequency: Frequency,
        interval: u32,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Result<Self> {
        Self::restore(frequency, interval, start_date, start_date, end_date)
    }

    /// Rebuilds a rule from stored state, validating every field.
    pub fn restore(
        frequency: Frequency,
        interval: u32,
        start_date: NaiveDate,
        next_trigger_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Result<Self> {
        if interval == 0 {
            return Err(ObligationError::Validation(
                "interval must be greater than zero".into(),
            ));
        }
        if next_trigger_date < start_date {
            return Err(ObligationError::Validation(format!(
                "next trigger date {next_trigger_date} precedes start date {start_date}"
            )));
        }
        if let Some(end) = end_date {
            if end < start_date {
                return Err(ObligationError::Validation(format!(
                    "end date {end} precedes start date {start_date}"
                )));
            }
        }
        check_reach(frequency, interval, start_date)?;
        Ok(Self {
            frequency,
            interval,
            start_date,
            next_trigger_date,
            end_date,
        })
    }

    /// Builds a rule from an API request, parsing the textual frequency.
    pub fn from_spec(spec: &RuleSpec) -> Result<Self> {
        let frequency = spec.frequency.parse::<Frequency>()?;
        let interval = positive_interval(spec.interval)?;
        Self::new(frequency, interval, spec.start_date, spec.end_date)
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn next_trigger_date(&self) -> NaiveDate {
        self.next_trigger_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn label(&self) -> String {
        self.frequency.label(self.interval)
    }

    pub fn should_trigger(&self, now: NaiveDate) -> bool {
        now >= self.next_trigger_date
    }

    /// `true` once the next trigger lies beyond the end date.
    pub fn should_end(&self) -> bool {
        matches!(self.end_date, Some(end) if self.next_trigger_date > end)
    }

    /// Jumps to the first occurrence strictly after `now` and returns it.
    ///
    /// Missed periods are not replayed: however far behind the rule is, a single call lands
    /// on the next future date. Fails, leaving the rule untouched, when that date is outside
    /// chrono's range.
    pub fn advance(&mut self, now: NaiveDate) -> Result<NaiveDate> {
        if self.next_trigger_date > now {
            return Ok(self.next_trigger_date);
        }
        let next = match self.frequency.linear_days(self.interval) {
            Some(period) => {
                let behind = (now - self.next_trigger_date).num_days();
                let units = (behind / period + 1)
                    .checked_mul(i64::from(self.interval))
                    .ok_or_else(|| out_of_range(self.frequency, self.interval, now))?;
                self.frequency
                    .shift(self.next_trigger_date, units, self.anchor_day())?
            }
            None => self.advance_calendar(now)?,
        };
        self.next_trigger_date = next;
        Ok(next)
    }

    /// Returns an advanced copy, leaving `self` untouched.
    pub fn advanced(&self, now: NaiveDate) -> Result<Self> {
        let mut copy = self.clone();
        copy.advance(now)?;
        Ok(copy)
    }

    fn advance_calendar(&self, now: NaiveDate) -> Result<NaiveDate> {
        let months_per_step = match self.frequency {
            Frequency::Yearly => i64::from(self.interval) * 12,
            _ => i64::from(self.interval),
        };
        let month_index =
            |date: NaiveDate| i64::from(date.year()) * 12 + i64::from(date.month0());
        let gap = month_index(now) - month_index(self.next_trigger_date);
        let skip = (gap / months_per_step).max(0);

        let mut candidate = self.next_trigger_date;
        if skip > 0 {
            candidate = self.frequency.shift(
                candidate,
                skip * i64::from(self.interval),
                self.anchor_day(),
            )?;
        }
        while candidate <= now {
            candidate = self
                .frequency
                .step_forward(candidate, self.interval, self.anchor_day())?;
        }
        Ok(candidate)
    }

    /// Start of the window that closes at the next trigger date.
    pub fn window_start(&self) -> Result<NaiveDate> {
        self.frequency
            .step_back(self.next_trigger_date, self.interval, self.anchor_day())
    }

    /// The accumulation window `[window_start, next_trigger_date)`.
    pub fn current_window(&self) -> Result<DateWindow> {
        Ok(DateWindow {
            start: self.window_start()?,
            end: self.next_trigger_date,
        })
    }

    /// Lists up to `count` upcoming trigger dates, stopping at the end date.
    pub fn upcoming(&self, count: usize) -> Result<Vec<NaiveDate>> {
        let mut dates = Vec::with_capacity(count);
        let mut cursor = self.clone();
        while dates.len() < count && !cursor.should_end() {
            let current = cursor.next_trigger_date;
            dates.push(current);
            cursor.advance(current)?;
        }
        Ok(dates)
    }

    /// Replaces the cadence. The stored next trigger is left alone until
    /// [`RecurrenceRule::revalidate`] is called.
    pub fn set_cadence(&mut self, frequency: Frequency, interval: u32) -> Result<()> {
        if interval == 0 {
            return Err(ObligationError::Validation(
                "interval must be greater than zero".into(),
            ));
        }
        check_reach(frequency, interval, self.start_date)?;
        self.frequency = frequency;
        self.interval = interval;
        Ok(())
    }

    pub fn set_end_date(&mut self, end_date: Option<NaiveDate>) -> Result<()> {
        if let Some(end) = end_date {
            if end < self.start_date {
                return Err(ObligationError::Validation(format!(
                    "end date {end} precedes start date {}",
                    self.start_date
                )));
            }
        }
        self.end_date = end_date;
        Ok(())
    }

    /// Recomputes the next trigger from the start date when the stored one no longer fits
    /// the cadence: before the start date, or more than one period past `today`.
    ///
    /// Returns whether the stored date changed.
    pub fn revalidate(&mut self, today: NaiveDate) -> Result<bool> {
        let horizon = self
            .frequency
            .step_forward(today, self.interval, self.anchor_day())?
            .max(self.start_date);
        if self.next_trigger_date >= self.start_date && self.next_trigger_date <= horizon {
            return Ok(false);
        }
        let mut rebuilt = self.clone();
        rebuilt.next_trigger_date = self.start_date;
        if self.start_date <= today {
            rebuilt.advance(today)?;
        }
        let changed = rebuilt.next_trigger_date != self.next_trigger_date;
        *self = rebuilt;
        Ok(changed)
    }

    fn anchor_day(&self) -> u32 {
        self.start_date.day()
    }
}

/// Rejects cadences whose single step from `start_date` already leaves chrono's range.
fn check_reach(frequency: Frequency, interval: u32, start_date: NaiveDate) -> Result<()> {
    let anchor = start_date.day();
    frequency
        .step_forward(start_date, interval, anchor)
        .and_then(|_| frequency.step_back(start_date, interval, anchor))
        .map(|_| ())
        .map_err(|_| {
            ObligationError::Validation(format!(
                "interval {interval} is too large for a {frequency} rule starting {start_date}"
            ))
        })
}

fn out_of_range(frequency: Frequency, interval: u32, now: NaiveDate) -> ObligationError {
    ObligationError::Validation(format!(
        "no {} occurrence with interval {interval} after {now} fits the supported date range",
        frequency.to_string().to_lowercase()
    ))
}

fn positive_interval(raw: i64) -> Result<u32> {
    if raw <= 0 {
        return Err(ObligationError::Validation(format!(
            "interval must be greater than zero, got {raw}"
        )));
    }
    u32::try_from(raw)
        .map_err(|_| ObligationError::Validation(format!("interval {raw} is too large")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleRecord {
    frequency: String,
    interval: i64,
    start_date: NaiveDate,
    next_trigger_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
}

impl TryFrom<RuleRecord> for RecurrenceRule {
    type Error = ObligationError;

    fn try_from(record: RuleRecord) -> Result<Self> {
        let frequency = record.frequency.parse::<Frequency>()?;
        let interval = positive_interval(record.interval)?;
        RecurrenceRule::restore(
            frequency,
            interval,
            record.start_date,
            record.next_trigger_date.unwrap_or(record.start_date),
            record.end_date,
        )
    }
}
