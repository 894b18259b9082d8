//! Wake alarms.
//!
//! An alarm rings at a wall-clock hour and minute, either weekly on a set
//! of weekdays or once (empty weekday set) at the next matching time.

use chrono::{DateTime, Datelike, Days, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::routine::SleepRoutine;
use crate::weekday::WeekdaySet;

/// A wake alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: String,
    pub hour: u8,
    pub minute: u8,
    /// Repeat days; empty means the alarm fires once.
    pub weekdays: WeekdaySet,
    pub label: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Alarm {
    /// # Errors
    /// Returns an error if `hour` or `minute` is out of range.
    pub fn new(hour: u8, minute: u8, weekdays: WeekdaySet, label: impl Into<String>) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidClockTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            hour,
            minute,
            weekdays,
            label: label.into(),
            enabled: true,
            created_at: Utc::now(),
        })
    }

    /// The wake alarm for a routine: its wake time on its weekdays.
    pub fn for_routine(routine: &SleepRoutine) -> Self {
        let wake = routine.wake_offset_secs.rem_euclid(86_400);
        Self {
            id: Uuid::new_v4().to_string(),
            hour: (wake / 3600) as u8,
            minute: (wake % 3600 / 60) as u8,
            weekdays: routine.weekdays,
            label: "Wake up".into(),
            enabled: true,
            created_at: Utc::now(),
        }
    }

    pub fn is_repeating(&self) -> bool {
        !self.weekdays.is_empty()
    }

    /// Next time the alarm rings at or after `now`, in `now`'s time zone.
    ///
    /// A time skipped by a DST transition rings one hour later, on the far
    /// side of the gap. Disabled alarms never ring.
    pub fn next_fire<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        if !self.enabled {
            return None;
        }
        let tz = now.timezone();
        let time = NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)?;
        let today = now.date_naive();

        (0..=7u64)
            .filter_map(|ahead| today.checked_add_days(Days::new(ahead)))
            .filter(|date| !self.is_repeating() || self.weekdays.contains(date.weekday()))
            .filter_map(|date| {
                let local = date.and_time(time);
                tz.from_local_datetime(&local)
                    .earliest()
                    .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
            })
            .find(|candidate| candidate >= now)
    }
}

/// Queries over a set of alarms.
#[derive(Debug, Clone, Default)]
pub struct AlarmBook {
    alarms: Vec<Alarm>,
}

impl AlarmBook {
    pub fn new(alarms: Vec<Alarm>) -> Self {
        Self { alarms }
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    /// Repeating alarms that ring on `day`.
    pub fn on_weekday(&self, day: chrono::Weekday) -> Vec<&Alarm> {
        self.repeating().filter(|alarm| alarm.weekdays.contains(day)).collect()
    }

    /// Repeating alarms that ring on every day of `days`.
    pub fn containing(&self, days: WeekdaySet) -> Vec<&Alarm> {
        self.repeating()
            .filter(|alarm| alarm.weekdays.is_superset(days))
            .collect()
    }

    /// Repeating alarms whose day set is exactly `days`.
    pub fn matching(&self, days: WeekdaySet) -> Vec<&Alarm> {
        self.repeating().filter(|alarm| alarm.weekdays == days).collect()
    }

    /// The earliest enabled alarm to ring at or after `now`.
    pub fn next_fire<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<(&Alarm, DateTime<Tz>)> {
        self.alarms
            .iter()
            .filter_map(|alarm| alarm.next_fire(now).map(|at| (alarm, at)))
            .min_by(|a, b| a.1.cmp(&b.1))
    }

    fn repeating(&self) -> impl Iterator<Item = &Alarm> {
        self.alarms.iter().filter(|alarm| alarm.is_repeating())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Weekday};
    use chrono_tz::America::New_York;

    // 2026-06-10 is a Wednesday.
    fn wednesday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, h, m, 0).single().unwrap()
    }

    fn alarm(hour: u8, minute: u8, days: WeekdaySet) -> Alarm {
        Alarm::new(hour, minute, days, "test").unwrap()
    }

    #[test]
    fn rejects_out_of_range_time() {
        assert!(Alarm::new(24, 0, WeekdaySet::EMPTY, "x").is_err());
        assert!(Alarm::new(7, 60, WeekdaySet::EMPTY, "x").is_err());
    }

    #[test]
    fn routine_alarm_uses_wake_time_and_days() {
        let routine = SleepRoutine::new(82_800, 25_200 + 900, 0, 0, WeekdaySet::WEEKDAYS).unwrap();
        let alarm = Alarm::for_routine(&routine);
        assert_eq!((alarm.hour, alarm.minute), (7, 15));
        assert_eq!(alarm.weekdays, WeekdaySet::WEEKDAYS);
    }

    #[test]
    fn repeating_alarm_skips_to_next_selected_day() {
        let alarm = alarm(7, 0, WeekdaySet::single(Weekday::Mon));
        let next = alarm.next_fire(&wednesday(9, 0)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 15, 7, 0, 0).single().unwrap());
    }

    #[test]
    fn repeating_alarm_rings_same_day_when_still_ahead() {
        let alarm = alarm(7, 0, WeekdaySet::single(Weekday::Wed));
        assert_eq!(alarm.next_fire(&wednesday(6, 0)).unwrap(), wednesday(7, 0));
        assert_eq!(alarm.next_fire(&wednesday(7, 0)).unwrap(), wednesday(7, 0));
        assert_eq!(
            alarm.next_fire(&wednesday(7, 1)).unwrap(),
            Utc.with_ymd_and_hms(2026, 6, 17, 7, 0, 0).single().unwrap()
        );
    }

    #[test]
    fn one_shot_alarm_rings_at_next_wall_clock_match() {
        let alarm = alarm(6, 30, WeekdaySet::EMPTY);
        assert_eq!(alarm.next_fire(&wednesday(5, 0)).unwrap(), wednesday(6, 30));
        assert_eq!(
            alarm.next_fire(&wednesday(8, 0)).unwrap(),
            Utc.with_ymd_and_hms(2026, 6, 11, 6, 30, 0).single().unwrap()
        );
    }

    #[test]
    fn disabled_alarm_never_rings() {
        let mut alarm = alarm(6, 30, WeekdaySet::EVERYDAY);
        alarm.enabled = false;
        assert!(alarm.next_fire(&wednesday(5, 0)).is_none());
    }

    #[test]
    fn time_in_spring_forward_gap_rings_after_gap() {
        let alarm = alarm(2, 30, WeekdaySet::single(Weekday::Sun));
        let now = New_York.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).single().unwrap();
        let next = alarm.next_fire(&now).unwrap();
        assert_eq!(next.date_naive(), chrono::NaiveDate::from_ymd_opt(2026, 3, 8).unwrap());
        assert_eq!((next.hour(), next.minute()), (3, 30));
    }

    #[test]
    fn book_queries_by_weekdays() {
        let weekdays = alarm(7, 0, WeekdaySet::WEEKDAYS);
        let weekend = alarm(9, 0, WeekdaySet::WEEKEND);
        let once = alarm(5, 0, WeekdaySet::EMPTY);
        let book = AlarmBook::new(vec![weekdays.clone(), weekend.clone(), once]);

        assert_eq!(book.on_weekday(Weekday::Sat), vec![&weekend]);
        assert_eq!(book.on_weekday(Weekday::Tue), vec![&weekdays]);
        let mon_tue = WeekdaySet::from_iter([Weekday::Mon, Weekday::Tue]);
        assert_eq!(book.containing(mon_tue), vec![&weekdays]);
        assert!(book.matching(mon_tue).is_empty());
        assert_eq!(book.matching(WeekdaySet::WEEKEND), vec![&weekend]);
    }

    #[test]
    fn book_picks_earliest_enabled_alarm() {
        let late = alarm(9, 0, WeekdaySet::EVERYDAY);
        let early = alarm(6, 0, WeekdaySet::EMPTY);
        let mut disabled = alarm(5, 0, WeekdaySet::EVERYDAY);
        disabled.enabled = false;
        let book = AlarmBook::new(vec![late, early.clone(), disabled]);

        let (alarm, at) = book.next_fire(&wednesday(4, 0)).unwrap();
        assert_eq!(alarm.id, early.id);
        assert_eq!(at, wednesday(6, 0));
    }
}
