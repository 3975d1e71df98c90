//! Five-field cron schedules (minute hour day-of-month month day-of-week), UTC only

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Upper bound for `next_after` searches; covers one full leap-year cycle
const MAX_LOOKAHEAD_DAYS: u32 = 366 * 4 + 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Expected 5 cron fields in '{expr}', found {found}")]
    FieldCount { expr: String, found: usize },
    #[error("Invalid {field} field: '{value}'")]
    InvalidField { field: &'static str, value: String },
    #[error("{field} value {value} out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expr: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days_of_month: BTreeSet<u32>,
    months: BTreeSet<u32>,
    /// 0 = Sunday; a 7 in the expression is folded into 0
    days_of_week: BTreeSet<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse a cron expression or one of the `@hourly`/`@daily`/`@weekly`/`@monthly`/`@yearly` presets
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        let expanded = match trimmed {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other => other,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount {
                expr: trimmed.to_string(),
                found: fields.len(),
            });
        }

        let days_of_week = parse_field(fields[4], "day-of-week", 0, 7)?
            .into_iter()
            .map(|d| d % 7)
            .collect();

        Ok(Self {
            expr: trimmed.to_string(),
            minutes: parse_field(fields[0], "minute", 0, 59)?,
            hours: parse_field(fields[1], "hour", 0, 23)?,
            days_of_month: parse_field(fields[2], "day-of-month", 1, 31)?,
            months: parse_field(fields[3], "month", 1, 12)?,
            days_of_week,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Whether the schedule fires at the minute containing `t`
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        self.matches_date(t.date_naive())
            && self.hours.contains(&t.hour())
            && self.minutes.contains(&t.minute())
    }

    /// First firing time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let first_day = start.date_naive();
        let mut date = first_day;

        for _ in 0..MAX_LOOKAHEAD_DAYS {
            if self.matches_date(date) {
                let (hour_floor, minute_floor) = if date == first_day {
                    (start.hour(), start.minute())
                } else {
                    (0, 0)
                };

                for &hour in self.hours.range(hour_floor..) {
                    let floor = if hour == hour_floor { minute_floor } else { 0 };
                    if let Some(&minute) = self.minutes.range(floor..).next() {
                        let naive = date.and_hms_opt(hour, minute, 0)?;
                        return Some(Utc.from_utc_datetime(&naive));
                    }
                }
            }
            date = date.succ_opt()?;
        }

        None
    }

    /// The next `count` firing times after `after`
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = after;
        while times.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    times.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        times
    }

    fn matches_date(&self, date: NaiveDate) -> bool {
        if !self.months.contains(&date.month()) {
            return false;
        }

        let dom = self.days_of_month.contains(&date.day());
        let dow = self
            .days_of_week
            .contains(&date.weekday().num_days_from_sunday());

        // Standard cron: when both day fields are restricted, either may match
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Parse one cron field: `*`, `a`, `a-b`, with optional `/step`, comma separated
fn parse_field(
    raw: &str,
    field: &'static str,
    min: u32,
    max: u32,
) -> Result<BTreeSet<u32>, ScheduleError> {
    let invalid = || ScheduleError::InvalidField {
        field,
        value: raw.to_string(),
    };

    let mut values = BTreeSet::new();
    for part in raw.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid())?;
                if step == 0 {
                    return Err(invalid());
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            let lo = parse_value(lo, raw, field, min, max)?;
            let hi = parse_value(hi, raw, field, min, max)?;
            if lo > hi {
                return Err(invalid());
            }
            (lo, hi)
        } else {
            let value = parse_value(range, raw, field, min, max)?;
            // `a/n` runs from a to the end of the range
            match step {
                Some(_) => (value, max),
                None => (value, value),
            }
        };

        let step = step.unwrap_or(1) as usize;
        values.extend((start..=end).step_by(step));
    }

    Ok(values)
}

/// Parse a single number within `min..=max`; `whole` is the full field for error reporting
fn parse_value(
    raw: &str,
    whole: &str,
    field: &'static str,
    min: u32,
    max: u32,
) -> Result<u32, ScheduleError> {
    let value: u32 = raw.parse().map_err(|_| ScheduleError::InvalidField {
        field,
        value: whole.to_string(),
    })?;
    if value < min || value > max {
        return Err(ScheduleError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}
