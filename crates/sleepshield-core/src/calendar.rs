//! Calendar-day arithmetic shared by routines and the blocking scheduler.
//!
//! Days are measured from one local start-of-day to the next, so a day in a
//! zone with daylight saving can be 23 or 25 hours long. Any `chrono`
//! time zone works as the calendar: `chrono::Local` on a device,
//! `chrono_tz::Tz` in tests.
//!
//! Lookups that cannot be resolved (a start of day that does not exist in
//! local time, date overflow) fall back to a fixed 86 400-second day. The
//! fallback is reported through [`CalendarOutcome::Degraded`] so callers
//! can log or assert on it.

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Nominal day length used by the fallback branch.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// How far past midnight to look for the first valid local time when a
/// transition skips midnight.
const START_OF_DAY_SEARCH_MINUTES: i64 = 3 * 60;
const START_OF_DAY_SEARCH_STEP: i64 = 15;

/// Result of a calendar computation, tagged with whether the real calendar
/// was consulted or the fixed-length fallback was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", content = "value", rename_all = "lowercase")]
pub enum CalendarOutcome<T> {
    Resolved(T),
    Degraded(T),
}

impl<T> CalendarOutcome<T> {
    pub fn value(self) -> T {
        match self {
            Self::Resolved(value) | Self::Degraded(value) => value,
        }
    }

    pub fn as_value(&self) -> &T {
        match self {
            Self::Resolved(value) | Self::Degraded(value) => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CalendarOutcome<U> {
        match self {
            Self::Resolved(value) => CalendarOutcome::Resolved(f(value)),
            Self::Degraded(value) => CalendarOutcome::Degraded(f(value)),
        }
    }
}

/// First instant of `date` in `tz`.
///
/// Returns `None` when no local time in the first hours of the day exists.
pub fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let mut minutes = 0;
    while minutes <= START_OF_DAY_SEARCH_MINUTES {
        let local = midnight.checked_add_signed(chrono::Duration::minutes(minutes))?;
        match tz.from_local_datetime(&local) {
            LocalResult::Single(instant) => return Some(instant),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest),
            LocalResult::None => minutes += START_OF_DAY_SEARCH_STEP,
        }
    }
    None
}

/// Bounds of the calendar day `date`: its start and the next day's start.
pub fn day_bounds<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
    let start = start_of_day(tz, date)?;
    let next = start_of_day(tz, date.succ_opt()?)?;
    Some((start, next))
}

/// Length of `date` in seconds, e.g. 82 800 on a spring-forward day.
pub fn day_length<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<i64> {
    let (start, next) = day_bounds(tz, date)?;
    let length = next.signed_duration_since(start).num_seconds();
    (length > 0).then_some(length)
}

/// Next date strictly after `after` that falls on `weekday`.
pub fn next_date_on(after: NaiveDate, weekday: Weekday) -> Option<NaiveDate> {
    let current = after.weekday().num_days_from_sunday();
    let target = weekday.num_days_from_sunday();
    let ahead = match (7 + target - current) % 7 {
        0 => 7,
        n => n,
    };
    after.checked_add_days(Days::new(u64::from(ahead)))
}

/// Wall-clock seconds since local midnight, read from the hour, minute and
/// second fields of `instant`.
pub fn wall_clock_offset<Tz: TimeZone>(instant: &DateTime<Tz>) -> i64 {
    i64::from(instant.hour()) * 3600 + i64::from(instant.minute()) * 60 + i64::from(instant.second())
}

/// Wrap `value` seconds, counted from the start of the day containing
/// `reference`, into `[0, dayLength)` of the day it lands on.
///
/// The day length is measured on the calendar, so values that land on a
/// daylight-saving transition day still end up inside that day.
pub fn normalized_offset<Tz: TimeZone>(value: i64, reference: &DateTime<Tz>) -> CalendarOutcome<i64> {
    let tz = reference.timezone();
    let fallback = || CalendarOutcome::Degraded(value.rem_euclid(SECONDS_PER_DAY));

    let Some(reference_start) = start_of_day(&tz, reference.date_naive()) else {
        return fallback();
    };
    let Some(candidate) = chrono::Duration::try_seconds(value)
        .and_then(|delta| reference_start.checked_add_signed(delta))
    else {
        return fallback();
    };
    let Some((candidate_start, next_start)) = day_bounds(&tz, candidate.date_naive()) else {
        return fallback();
    };

    let day_length = next_start.signed_duration_since(candidate_start.clone()).num_seconds();
    if day_length <= 0 {
        return fallback();
    }
    let elapsed = candidate.signed_duration_since(candidate_start).num_seconds();
    CalendarOutcome::Resolved(elapsed.rem_euclid(day_length))
}

/// [`normalized_offset`] of `base + delta`.
///
/// A sum that does not fit in an `i64` is wrapped with the fixed-length
/// day and reported as degraded.
pub fn normalized_sum<Tz: TimeZone>(base: i64, delta: i128, reference: &DateTime<Tz>) -> CalendarOutcome<i64> {
    let sum = i128::from(base) + delta;
    match i64::try_from(sum) {
        Ok(value) => normalized_offset(value, reference),
        Err(_) => CalendarOutcome::Degraded(sum.rem_euclid(i128::from(SECONDS_PER_DAY)) as i64),
    }
}
