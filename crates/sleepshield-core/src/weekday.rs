//! Compact bitset over the seven days of the week.
//!
//! Bit order is fixed: Sunday is bit 0 through Saturday at bit 6. The raw
//! bits are the persisted form of a routine's or alarm's repeat days.

use std::fmt;
use std::ops::{BitAnd, BitOr, Sub};
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const DAY_MASK: u8 = 0b0111_1111;

/// All days in canonical Sunday-first order.
pub const ALL_DAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// A set of weekdays stored as a 7-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct WeekdaySet(u8);

impl From<u8> for WeekdaySet {
    fn from(bits: u8) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl From<WeekdaySet> for u8 {
    fn from(set: WeekdaySet) -> Self {
        set.0
    }
}

fn bit(day: Weekday) -> u8 {
    1 << day.num_days_from_sunday()
}

impl WeekdaySet {
    pub const EMPTY: Self = Self(0);
    pub const EVERYDAY: Self = Self(DAY_MASK);
    /// Monday through Friday.
    pub const WEEKDAYS: Self = Self(0b0011_1110);
    /// Saturday and Sunday.
    pub const WEEKEND: Self = Self(0b0100_0001);

    /// Build from persisted bits. Bits above Saturday are discarded.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & DAY_MASK)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn single(day: Weekday) -> Self {
        Self(bit(day))
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & bit(day) != 0
    }

    /// True when every day of `other` is also in `self`.
    pub fn is_superset(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn subtracting(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Add `day`. Returns whether the set changed.
    pub fn insert(&mut self, day: Weekday) -> bool {
        let before = self.0;
        self.0 |= bit(day);
        before != self.0
    }

    /// Remove `day`. Returns whether the set changed.
    pub fn remove(&mut self, day: Weekday) -> bool {
        let before = self.0;
        self.0 &= !bit(day);
        before != self.0
    }

    /// Flip `day`, as a UI toggle does. Returns whether the day is now present.
    pub fn toggle(&mut self, day: Weekday) -> bool {
        if !self.remove(day) {
            self.insert(day);
        }
        self.contains(day)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in the set, Sunday first.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        ALL_DAYS.into_iter().filter(move |day| self.contains(*day))
    }
}

impl BitOr for WeekdaySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for WeekdaySet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl Sub for WeekdaySet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.subtracting(rhs)
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl From<Weekday> for WeekdaySet {
    fn from(day: Weekday) -> Self {
        Self::single(day)
    }
}

/// Short English name, e.g. "Mon".
pub fn short_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "Sun",
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EMPTY => f.write_str("never"),
            Self::EVERYDAY => f.write_str("every day"),
            Self::WEEKDAYS => f.write_str("weekdays"),
            Self::WEEKEND => f.write_str("weekend"),
            set => {
                let names: Vec<&str> = set.iter().map(short_name).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}

impl FromStr for WeekdaySet {
    type Err = ValidationError;

    /// Accepts `everyday`, `weekdays`, `weekend`, `none`, or a comma-separated
    /// list of day names (`mon,wed,fri`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        match trimmed.as_str() {
            "everyday" | "every day" | "daily" | "all" => return Ok(Self::EVERYDAY),
            "weekdays" => return Ok(Self::WEEKDAYS),
            "weekend" | "weekends" => return Ok(Self::WEEKEND),
            "none" | "never" | "" => return Ok(Self::EMPTY),
            _ => {}
        }

        trimmed
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<Weekday>()
                    .map_err(|_| ValidationError::InvalidWeekday(part.trim().to_string()))
            })
            .collect()
    }
}
