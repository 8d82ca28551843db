//! Five-field cron expressions
//!
//! `minute hour day-of-month month day-of-week`, evaluated in UTC. Each field
//! accepts `*`, single values, `a-b` ranges, `/step` suffixes and comma lists.
//! Months and weekdays also accept three-letter names (`JAN`, `MON`), and
//! day-of-week `7` is an alias for Sunday.
//!
//! When both day-of-month and day-of-week are restricted (neither starts with
//! `*`) a day matches if *either* matches, as in classic cron.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use thiserror::Error;

/// How far ahead `next_after` searches before giving up. Any satisfiable
/// expression fires at least once every 8 years (Feb 29 across a skipped
/// century leap year), so this only bounds pathological input.
const SEARCH_HORIZON_YEARS: i32 = 10;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronParseError {
    #[error("invalid cron expression: expected 5 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid cron expression: {field} value '{value}' is not a number")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid cron expression: {field} value {value} is outside {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("invalid cron expression: {field} range {start}-{end} is reversed")]
    ReversedRange {
        field: &'static str,
        start: u32,
        end: u32,
    },

    #[error("invalid cron expression: {field} step '{step}' must be a positive number")]
    InvalidStep { field: &'static str, step: String },

    #[error("invalid cron expression: day-of-month and month never coincide")]
    NeverFires,
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Offset added to a name's index to get its numeric value
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    name_base: 1,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    name_base: 0,
};

/// Set of allowed values for one field, bit `n` set when `n` is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }

    fn insert_range(&mut self, start: u32, end: u32, step: u32) {
        let mut v = start;
        while v <= end {
            self.0 |= 1 << v;
            v += step;
        }
    }
}

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpression {
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }

        let minutes = parse_field(fields[0], MINUTE)?;
        let hours = parse_field(fields[1], HOUR)?;
        let days_of_month = parse_field(fields[2], DAY_OF_MONTH)?;
        let months = parse_field(fields[3], MONTH)?;
        let mut days_of_week = parse_field(fields[4], DAY_OF_WEEK)?;

        // 7 is Sunday
        if days_of_week.contains(7) {
            days_of_week.0 = (days_of_week.0 & !(1 << 7)) | 1;
        }

        let cron = CronExpression {
            source: fields.join(" "),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        };

        if !cron.can_fire() {
            return Err(CronParseError::NeverFires);
        }

        Ok(cron)
    }

    /// The normalized source text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `instant` falls inside a firing minute
    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        let t = instant.naive_utc();
        self.months.contains(t.month())
            && self.day_matches(t.date())
            && self.hours.contains(t.hour())
            && self.minutes.contains(t.minute())
    }

    /// Smallest fire time strictly greater than `instant`.
    ///
    /// Returns `None` only if nothing fires within the search horizon, which
    /// `parse` already rules out for well-formed input.
    pub fn next_after(&self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = truncate_to_minute(instant.naive_utc()) + Duration::minutes(1);
        let horizon = start.year() + SEARCH_HORIZON_YEARS;
        let mut t = start;

        loop {
            if t.year() > horizon {
                return None;
            }
            if !self.months.contains(t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = truncate_to_hour(t) + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// A weekday-restricted expression always fires eventually; otherwise
    /// some selected month must contain some selected day.
    fn can_fire(&self) -> bool {
        if self.dow_restricted {
            return true;
        }
        (1..=12u32)
            .filter(|m| self.months.contains(*m))
            .any(|m| (1..=max_days_in_month(m)).any(|d| self.days_of_month.contains(d)))
    }
}

impl FromStr for CronExpression {
    type Err = CronParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CronExpression::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse and compute the next fire time in one step
pub fn next_after(
    expr: &str,
    instant: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, CronParseError> {
    Ok(CronExpression::parse(expr)?.next_after(instant))
}

fn parse_field(field: &str, spec: FieldSpec) -> Result<FieldSet, CronParseError> {
    let mut set = FieldSet(0);
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(parse_step(step, spec)?)),
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let start = parse_value(a, spec)?;
            let end = parse_value(b, spec)?;
            if start > end {
                return Err(CronParseError::ReversedRange {
                    field: spec.name,
                    start,
                    end,
                });
            }
            (start, end)
        } else {
            let value = parse_value(range, spec)?;
            // `a/n` means a through the end of the field
            match step {
                Some(_) => (value, spec.max),
                None => (value, value),
            }
        };

        set.insert_range(start, end, step.unwrap_or(1));
    }
    Ok(set)
}

fn parse_step(step: &str, spec: FieldSpec) -> Result<u32, CronParseError> {
    match step.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CronParseError::InvalidStep {
            field: spec.name,
            step: step.to_string(),
        }),
    }
}

fn parse_value(raw: &str, spec: FieldSpec) -> Result<u32, CronParseError> {
    let upper = raw.to_ascii_uppercase();
    let value = match spec.names.iter().position(|n| *n == upper) {
        Some(idx) => idx as u32 + spec.name_base,
        None => raw.parse::<u32>().map_err(|_| CronParseError::InvalidValue {
            field: spec.name,
            value: raw.to_string(),
        })?,
    };
    if value < spec.min || value > spec.max {
        return Err(CronParseError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

fn max_days_in_month(month: u32) -> u32 {
    match month {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn truncate_to_hour(t: NaiveDateTime) -> NaiveDateTime {
    truncate_to_minute(t).with_minute(0).unwrap_or(t)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn next(expr: &str, from: DateTime<Utc>) -> DateTime<Utc> {
        CronExpression::parse(expr).unwrap().next_after(from).unwrap()
    }

    /// Minute-by-minute reference search used to check minimality
    fn brute_force_next(cron: &CronExpression, from: DateTime<Utc>) -> DateTime<Utc> {
        let mut t = from
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap()
            + Duration::minutes(1);
        loop {
            if cron.matches(t) {
                return t;
            }
            t += Duration::minutes(1);
        }
    }

    #[test]
    fn test_parse_valid_expressions() {
        for expr in [
            "* * * * *",
            "*/5 * * * *",
            "0 2 * * *",
            "0 9 * * MON-FRI",
            "0 6,18 * * *",
            "0 0 1 * *",
            "15-45/10 8-17 * JAN-MAR 1,3,5",
            "0 0 * * 7",
            "5/15 * * * *",
        ] {
            assert!(CronExpression::parse(expr).is_ok(), "{expr} should parse");
        }
    }

    #[test]
    fn test_parse_wrong_field_count() {
        assert_eq!(
            CronExpression::parse("0 30 9 * * *"),
            Err(CronParseError::FieldCount(6))
        );
        assert_eq!(
            CronExpression::parse("* * *"),
            Err(CronParseError::FieldCount(3))
        );
        assert_eq!(CronExpression::parse(""), Err(CronParseError::FieldCount(0)));
    }

    #[test]
    fn test_parse_out_of_range() {
        assert!(matches!(
            CronExpression::parse("60 * * * *"),
            Err(CronParseError::OutOfRange { field: "minute", .. })
        ));
        assert!(matches!(
            CronExpression::parse("0 24 * * *"),
            Err(CronParseError::OutOfRange { field: "hour", .. })
        ));
        assert!(matches!(
            CronExpression::parse("0 0 0 * *"),
            Err(CronParseError::OutOfRange { field: "day-of-month", .. })
        ));
        assert!(matches!(
            CronExpression::parse("0 0 * 13 *"),
            Err(CronParseError::OutOfRange { field: "month", .. })
        ));
        assert!(matches!(
            CronExpression::parse("0 0 * * 8"),
            Err(CronParseError::OutOfRange { field: "day-of-week", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            CronExpression::parse("a * * * *"),
            Err(CronParseError::InvalidValue { .. })
        ));
        assert!(matches!(
            CronExpression::parse("*/0 * * * *"),
            Err(CronParseError::InvalidStep { .. })
        ));
        assert!(matches!(
            CronExpression::parse("30-10 * * * *"),
            Err(CronParseError::ReversedRange { .. })
        ));
        assert_eq!(
            CronExpression::parse("0 0 30 2 *"),
            Err(CronParseError::NeverFires)
        );
    }

    #[test]
    fn test_next_daily_at_two() {
        let cron = "0 2 * * *";
        assert_eq!(next(cron, at(2024, 3, 10, 1, 0, 0)), at(2024, 3, 10, 2, 0, 0));
        assert_eq!(next(cron, at(2024, 3, 10, 2, 0, 0)), at(2024, 3, 11, 2, 0, 0));
        assert_eq!(next(cron, at(2024, 3, 10, 2, 0, 1)), at(2024, 3, 11, 2, 0, 0));
        assert_eq!(next(cron, at(2024, 12, 31, 23, 30, 0)), at(2025, 1, 1, 2, 0, 0));
    }

    #[test]
    fn test_next_is_strictly_after() {
        let every_minute = "* * * * *";
        let t = at(2024, 5, 5, 10, 15, 0);
        assert_eq!(next(every_minute, t), at(2024, 5, 5, 10, 16, 0));

        let t = at(2024, 5, 5, 10, 15, 59);
        assert_eq!(next(every_minute, t), at(2024, 5, 5, 10, 16, 0));
    }

    #[test]
    fn test_next_with_steps_and_lists() {
        assert_eq!(next("*/15 * * * *", at(2024, 1, 1, 0, 14, 0)), at(2024, 1, 1, 0, 15, 0));
        assert_eq!(next("*/15 * * * *", at(2024, 1, 1, 0, 45, 0)), at(2024, 1, 1, 1, 0, 0));
        assert_eq!(next("0 6,18 * * *", at(2024, 1, 1, 7, 0, 0)), at(2024, 1, 1, 18, 0, 0));
    }

    #[test]
    fn test_next_weekday_restriction() {
        // 2024-03-09 is a Saturday
        assert_eq!(
            next("0 9 * * MON-FRI", at(2024, 3, 9, 12, 0, 0)),
            at(2024, 3, 11, 9, 0, 0)
        );
        assert_eq!(next("0 0 * * 7", at(2024, 3, 9, 12, 0, 0)), at(2024, 3, 10, 0, 0, 0));
    }

    #[test]
    fn test_day_of_month_or_day_of_week() {
        // 13th of the month OR any Friday. 2024-09-01 is a Sunday; first Friday is the 6th.
        assert_eq!(next("0 0 13 * 5", at(2024, 9, 1, 0, 0, 0)), at(2024, 9, 6, 0, 0, 0));
        // From the 7th the next match is the following Friday (13th is also Friday).
        assert_eq!(next("0 0 13 * 5", at(2024, 9, 7, 0, 0, 0)), at(2024, 9, 13, 0, 0, 0));
        // From 14th: next Friday is the 20th.
        assert_eq!(next("0 0 13 * 5", at(2024, 9, 14, 0, 0, 0)), at(2024, 9, 20, 0, 0, 0));
        // Star in day-of-week means only the day-of-month restricts.
        assert_eq!(next("0 0 13 * *", at(2024, 9, 1, 0, 0, 0)), at(2024, 9, 13, 0, 0, 0));
    }

    #[test]
    fn test_next_leap_day() {
        assert_eq!(next("0 0 29 2 *", at(2023, 3, 1, 0, 0, 0)), at(2024, 2, 29, 0, 0, 0));
    }

    #[test]
    fn test_next_after_is_minimal() {
        let exprs = [
            "* * * * *",
            "*/7 * * * *",
            "0 2 * * *",
            "30 */5 * * *",
            "0 0 13 * 5",
            "45 23 * * SUN",
            "0 12 1,15 * *",
            "10-20/5 3 * * 1-3",
        ];
        let starts = [
            at(2024, 1, 1, 0, 0, 0),
            at(2024, 2, 28, 23, 59, 30),
            at(2024, 6, 15, 13, 7, 0),
            at(2025, 12, 31, 23, 59, 59),
        ];
        for expr in exprs {
            let cron = CronExpression::parse(expr).unwrap();
            for start in starts {
                let fast = cron.next_after(start).unwrap();
                assert!(fast > start, "{expr}: {fast} not after {start}");
                assert_eq!(fast, brute_force_next(&cron, start), "{expr} from {start}");
            }
        }
    }

    #[test]
    fn test_display_normalizes_whitespace() {
        let cron = CronExpression::parse("  0   2 *  * * ").unwrap();
        assert_eq!(cron.to_string(), "0 2 * * *");
    }
}
