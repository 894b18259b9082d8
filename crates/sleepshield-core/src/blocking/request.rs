//! Request derivation: from a routine to named weekly intervals.
//!
//! Each active weekday yields one interval when the blocking window fits in
//! a day, or two when it crosses midnight:
//!
//! ```text
//! start <= end:   d   [start ............ end)
//! start >  end:   d   [start .. 23:59:59]          (segment 0)
//!                 d+1 [00:00 .. end)               (segment 1)
//! ```
//!
//! Requests are identified by a [`RequestKey`]; the string name handed to
//! the monitor is produced only at that boundary.

use chrono::{DateTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::{day_bounds, next_date_on, CalendarOutcome, SECONDS_PER_DAY};
use crate::routine::SleepRoutine;

/// Hour, minute and second on a given weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeComponents {
    pub weekday: Weekday,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeComponents {
    pub fn new(weekday: Weekday, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            weekday,
            hour,
            minute,
            second,
        }
    }

    pub fn midnight(weekday: Weekday) -> Self {
        Self::new(weekday, 0, 0, 0)
    }

    pub fn end_of_day(weekday: Weekday) -> Self {
        Self::new(weekday, 23, 59, 59)
    }

    /// Seconds after midnight on the wall clock.
    pub fn offset_secs(&self) -> i64 {
        i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second)
    }

    /// Seconds since Sunday 00:00 on the wall clock.
    pub fn week_position(&self) -> i64 {
        i64::from(self.weekday.num_days_from_sunday()) * SECONDS_PER_DAY + self.offset_secs()
    }

    fn from_offset_naive(weekday: Weekday, offset: i64) -> Self {
        let offset = offset.rem_euclid(SECONDS_PER_DAY);
        Self::new(
            weekday,
            (offset / 3600) as u8,
            (offset % 3600 / 60) as u8,
            (offset % 60) as u8,
        )
    }
}

/// A weekly interval as the monitor understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSchedule {
    pub start: TimeComponents,
    pub end: TimeComponents,
    pub repeats_weekly: bool,
}

const WEEK_SECS: i64 = 7 * SECONDS_PER_DAY;

impl IntervalSchedule {
    pub fn weekly(start: TimeComponents, end: TimeComponents) -> Self {
        Self {
            start,
            end,
            repeats_weekly: true,
        }
    }

    /// Whether the wall-clock time `offset_secs` on `weekday` falls inside
    /// the interval. The start is inclusive, the end exclusive; an end of
    /// 23:59:59 covers the day's last second.
    pub fn contains(&self, weekday: Weekday, offset_secs: i64) -> bool {
        let position = i64::from(weekday.num_days_from_sunday()) * SECONDS_PER_DAY + offset_secs;
        let start = self.start.week_position();
        let mut end = self.end.week_position();
        if self.end.offset_secs() == SECONDS_PER_DAY - 1 {
            end = (end + 1) % WEEK_SECS;
        }

        if start <= end {
            position >= start && position < end
        } else {
            position >= start || position < end
        }
    }

    /// Interval length in seconds, wrapping across the week boundary.
    pub fn duration_secs(&self) -> i64 {
        (self.end.week_position() - self.start.week_position()).rem_euclid(WEEK_SECS)
    }
}

/// Structured identity of one monitored interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub routine_id: String,
    pub weekday: Weekday,
    pub segment: u8,
}

/// Calendar weekday number, Sunday = 1 through Saturday = 7.
pub fn weekday_number(day: Weekday) -> u8 {
    day.number_from_sunday() as u8
}

fn weekday_from_number(number: u8) -> Option<Weekday> {
    match number {
        1 => Some(Weekday::Sun),
        2 => Some(Weekday::Mon),
        3 => Some(Weekday::Tue),
        4 => Some(Weekday::Wed),
        5 => Some(Weekday::Thu),
        6 => Some(Weekday::Fri),
        7 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Replace characters the monitor does not accept in names with `-`.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

impl RequestKey {
    pub fn new(routine_id: impl Into<String>, weekday: Weekday, segment: u8) -> Self {
        Self {
            routine_id: routine_id.into(),
            weekday,
            segment,
        }
    }

    /// `<prefix>.<identity>.d<weekday number>.s<segment>`
    pub fn activity_name(&self, prefix: &str) -> String {
        format!(
            "{prefix}.{}.d{}.s{}",
            sanitize_identifier(&self.routine_id),
            weekday_number(self.weekday),
            self.segment
        )
    }

    /// Parse a name produced by [`RequestKey::activity_name`] with the same prefix.
    ///
    /// The identity comes back in its sanitized form.
    pub fn parse(prefix: &str, name: &str) -> Option<Self> {
        let rest = name.strip_prefix(prefix)?.strip_prefix('.')?;
        let (rest, segment) = rest.rsplit_once(".s")?;
        let (routine_id, day) = rest.rsplit_once(".d")?;
        if routine_id.is_empty() {
            return None;
        }
        let weekday = weekday_from_number(day.parse().ok()?)?;
        Some(Self::new(routine_id, weekday, segment.parse().ok()?))
    }
}

/// One interval to register, with the key it is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub key: RequestKey,
    pub schedule: IntervalSchedule,
    /// Set when any calendar lookup behind this request fell back to a fixed-length day.
    pub degraded: bool,
}

/// Wall-clock components for `offset` seconds into the next `weekday`
/// after the day of `reference`.
///
/// The offset is reduced modulo that date's measured length, so the
/// conversion follows daylight-saving transitions on the target date.
pub fn time_components<Tz: TimeZone>(
    offset: i64,
    weekday: Weekday,
    reference: &DateTime<Tz>,
) -> CalendarOutcome<TimeComponents> {
    let tz = reference.timezone();
    let fallback = || CalendarOutcome::Degraded(TimeComponents::from_offset_naive(weekday, offset));

    let Some(target_date) = next_date_on(reference.date_naive(), weekday) else {
        return fallback();
    };
    let Some((day_start, next_start)) = day_bounds(&tz, target_date) else {
        return fallback();
    };
    let day_length = next_start.signed_duration_since(day_start.clone()).num_seconds();
    if day_length <= 0 {
        return fallback();
    }

    let position = offset.rem_euclid(day_length);
    let Some(target) = chrono::Duration::try_seconds(position)
        .and_then(|delta| day_start.checked_add_signed(delta))
    else {
        return fallback();
    };
    CalendarOutcome::Resolved(TimeComponents::new(
        weekday,
        target.hour() as u8,
        target.minute() as u8,
        target.second() as u8,
    ))
}

/// Every request needed to enforce `routine` under `identity`.
///
/// Weekdays are visited Sunday first; an empty weekday set yields nothing.
pub fn derive_requests<Tz: TimeZone>(
    routine: &SleepRoutine,
    identity: &str,
    reference: &DateTime<Tz>,
) -> Vec<ScheduleRequest> {
    if routine.weekdays.is_empty() {
        return Vec::new();
    }

    let start_offset = routine.block_start_offset(reference);
    let end_offset = routine.block_end_offset(reference);
    let window_degraded = start_offset.is_degraded() || end_offset.is_degraded();
    let (start, end) = (start_offset.value(), end_offset.value());

    let mut requests = Vec::with_capacity(routine.weekdays.len() * 2);
    for weekday in routine.weekdays.iter() {
        if start <= end {
            let start_at = time_components(start, weekday, reference);
            let end_at = time_components(end, weekday, reference);
            requests.push(ScheduleRequest {
                key: RequestKey::new(identity, weekday, 0),
                degraded: window_degraded || start_at.is_degraded() || end_at.is_degraded(),
                schedule: IntervalSchedule::weekly(start_at.value(), end_at.value()),
            });
        } else {
            let start_at = time_components(start, weekday, reference);
            requests.push(ScheduleRequest {
                key: RequestKey::new(identity, weekday, 0),
                degraded: window_degraded || start_at.is_degraded(),
                schedule: IntervalSchedule::weekly(start_at.value(), TimeComponents::end_of_day(weekday)),
            });

            let next_day = weekday.succ();
            let end_at = time_components(end, next_day, reference);
            requests.push(ScheduleRequest {
                key: RequestKey::new(identity, next_day, 1),
                degraded: window_degraded || end_at.is_degraded(),
                schedule: IntervalSchedule::weekly(TimeComponents::midnight(next_day), end_at.value()),
            });
        }
    }
    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weekday::WeekdaySet;
    use chrono::Utc;
    use chrono_tz::America::New_York;

    fn reference() -> DateTime<Utc> {
        // Wednesday
        Utc.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).single().unwrap()
    }

    #[test]
    fn overnight_window_splits_into_two_segments() {
        let routine =
            SleepRoutine::new(82_800, 25_200, 3_600, 1_800, WeekdaySet::single(Weekday::Mon)).unwrap();
        let requests = derive_requests(&routine, "r1", &reference());

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].key, RequestKey::new("r1", Weekday::Mon, 0));
        assert_eq!(requests[0].schedule.start, TimeComponents::new(Weekday::Mon, 22, 0, 0));
        assert_eq!(requests[0].schedule.end, TimeComponents::new(Weekday::Mon, 23, 59, 59));
        assert_eq!(requests[1].key, RequestKey::new("r1", Weekday::Tue, 1));
        assert_eq!(requests[1].schedule.start, TimeComponents::new(Weekday::Tue, 0, 0, 0));
        assert_eq!(requests[1].schedule.end, TimeComponents::new(Weekday::Tue, 7, 30, 0));
        assert!(requests.iter().all(|r| r.schedule.repeats_weekly && !r.degraded));
    }

    #[test]
    fn same_day_window_is_one_request() {
        let routine = SleepRoutine::new(36_000, 43_200, 0, 0, WeekdaySet::single(Weekday::Wed)).unwrap();
        let requests = derive_requests(&routine, "r1", &reference());

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key, RequestKey::new("r1", Weekday::Wed, 0));
        assert_eq!(requests[0].schedule.start, TimeComponents::new(Weekday::Wed, 10, 0, 0));
        assert_eq!(requests[0].schedule.end, TimeComponents::new(Weekday::Wed, 12, 0, 0));
    }

    #[test]
    fn saturday_segment_wraps_to_sunday() {
        let routine =
            SleepRoutine::new(82_800, 25_200, 3_600, 0, WeekdaySet::single(Weekday::Sat)).unwrap();
        let requests = derive_requests(&routine, "r1", &reference());
        assert_eq!(requests[1].key.weekday, Weekday::Sun);
        assert_eq!(requests[1].key.activity_name("p"), "p.r1.d1.s1");
    }

    #[test]
    fn empty_weekdays_yield_no_requests() {
        let routine = SleepRoutine::new(82_800, 25_200, 3_600, 1_800, WeekdaySet::EMPTY).unwrap();
        assert!(derive_requests(&routine, "r1", &reference()).is_empty());
    }

    #[test]
    fn everyday_overnight_names_are_unique() {
        let routine = SleepRoutine::new(82_800, 25_200, 3_600, 1_800, WeekdaySet::EVERYDAY).unwrap();
        let requests = derive_requests(&routine, "r1", &reference());
        assert_eq!(requests.len(), 14);
        let mut names: Vec<String> = requests.iter().map(|r| r.key.activity_name("p")).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 14);
    }

    #[test]
    fn derivation_is_deterministic() {
        let routine = SleepRoutine::new(82_800, 25_200, 3_600, 1_800, WeekdaySet::WEEKDAYS).unwrap();
        assert_eq!(
            derive_requests(&routine, "r1", &reference()),
            derive_requests(&routine, "r1", &reference())
        );
    }

    #[test]
    fn activity_names_round_trip() {
        let key = RequestKey::new("routine/42 x", Weekday::Tue, 1);
        let name = key.activity_name("sleepshield.blocking");
        assert_eq!(name, "sleepshield.blocking.routine-42-x.d3.s1");
        let parsed = RequestKey::parse("sleepshield.blocking", &name).unwrap();
        assert_eq!(parsed, RequestKey::new("routine-42-x", Weekday::Tue, 1));
        assert!(RequestKey::parse("other", &name).is_none());
        assert!(RequestKey::parse("sleepshield.blocking", "sleepshield.blocking.x.d9.s0").is_none());
    }

    #[test]
    fn dotted_identities_parse_from_the_right() {
        let key = RequestKey::new("a.b.c", Weekday::Fri, 0);
        let name = key.activity_name("p");
        assert_eq!(RequestKey::parse("p", &name), Some(key));
    }

    #[test]
    fn components_round_trip_on_plain_days() {
        let reference = New_York.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).single().unwrap();
        for offset in [0, 1, 3_600, 27_000, 79_200, 86_399] {
            let components = time_components(offset, Weekday::Thu, &reference);
            assert!(!components.is_degraded());
            assert_eq!(components.value().offset_secs(), offset);
        }
    }

    #[test]
    fn components_follow_spring_forward_on_target_date() {
        // Saturday 2026-03-07; the next Sunday is the 23-hour March 8th.
        let reference = New_York.with_ymd_and_hms(2026, 3, 7, 9, 0, 0).single().unwrap();
        let components = time_components(3 * 3600, Weekday::Sun, &reference).value();
        assert_eq!((components.hour, components.minute), (4, 0));
        let wrapped = time_components(82_800, Weekday::Sun, &reference).value();
        assert_eq!(wrapped.offset_secs(), 0);
    }

    #[test]
    fn unresolvable_days_fall_back_and_flag_requests() {
        use crate::calendar::skipped_mornings::SkippedMornings;

        let reference = SkippedMornings.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).single().unwrap();
        let components = time_components(30_000, Weekday::Mon, &reference);
        assert_eq!(components, CalendarOutcome::Degraded(TimeComponents::new(Weekday::Mon, 8, 20, 0)));

        let routine =
            SleepRoutine::new(82_800, 25_200, 3_600, 1_800, WeekdaySet::single(Weekday::Mon)).unwrap();
        let requests = derive_requests(&routine, "r1", &reference);
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.degraded));
        assert_eq!(requests[0].schedule.start, TimeComponents::new(Weekday::Mon, 22, 0, 0));
        assert_eq!(requests[1].schedule.end, TimeComponents::new(Weekday::Tue, 7, 30, 0));
    }

    #[test]
    fn oversized_buffers_derive_without_panicking() {
        let routine = SleepRoutine::new(82_800, 25_200, 0, i64::MAX / 2, WeekdaySet::single(Weekday::Mon)).unwrap();
        let requests = derive_requests(&routine, "r1", &reference());
        assert!(!requests.is_empty());
        assert!(requests.iter().all(|r| r.degraded));
    }

    #[test]
    fn interval_contains_respects_bounds() {
        let schedule = IntervalSchedule::weekly(
            TimeComponents::new(Weekday::Mon, 22, 0, 0),
            TimeComponents::end_of_day(Weekday::Mon),
        );
        assert!(schedule.contains(Weekday::Mon, 79_200));
        assert!(schedule.contains(Weekday::Mon, 86_399));
        assert!(!schedule.contains(Weekday::Mon, 79_199));
        assert!(!schedule.contains(Weekday::Tue, 0));

        let morning = IntervalSchedule::weekly(
            TimeComponents::midnight(Weekday::Tue),
            TimeComponents::new(Weekday::Tue, 7, 30, 0),
        );
        assert!(morning.contains(Weekday::Tue, 0));
        assert!(!morning.contains(Weekday::Tue, 27_000));
        assert_eq!(morning.duration_secs(), 27_000);
    }

    #[test]
    fn saturday_end_of_day_wraps_into_sunday_boundary() {
        let schedule = IntervalSchedule::weekly(
            TimeComponents::new(Weekday::Sat, 23, 0, 0),
            TimeComponents::end_of_day(Weekday::Sat),
        );
        assert!(schedule.contains(Weekday::Sat, 86_399));
        assert!(!schedule.contains(Weekday::Sun, 0));
    }
}
