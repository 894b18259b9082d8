//! Sleep routine record and its derived blocking window.
//!
//! A routine stores four raw values (sleep time, wake time, and the buffers
//! before sleep and after waking) plus the days it repeats on. The blocking
//! window runs from `sleep - pre_block` to `wake + post_block`, both wrapped
//! onto a single calendar day; when the start is later than the end the
//! window crosses midnight.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{normalized_sum, wall_clock_offset, CalendarOutcome, SECONDS_PER_DAY};
use crate::error::ValidationError;
use crate::weekday::WeekdaySet;

/// One user-configured sleep/wake schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepRoutine {
    /// Stable identity assigned on first save. `None` until persisted.
    #[serde(default)]
    pub id: Option<String>,
    /// Seconds after local midnight.
    pub sleep_offset_secs: i64,
    /// Seconds after local midnight.
    pub wake_offset_secs: i64,
    pub pre_block_secs: i64,
    pub post_block_secs: i64,
    pub weekdays: WeekdaySet,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl SleepRoutine {
    /// Create an unsaved routine.
    ///
    /// # Errors
    /// Returns an error if an offset is outside a single day or a buffer is
    /// negative.
    pub fn new(
        sleep_offset_secs: i64,
        wake_offset_secs: i64,
        pre_block_secs: i64,
        post_block_secs: i64,
        weekdays: WeekdaySet,
    ) -> Result<Self, ValidationError> {
        let now = Utc::now();
        let routine = Self {
            id: None,
            sleep_offset_secs,
            wake_offset_secs,
            pre_block_secs,
            post_block_secs,
            weekdays,
            created_at: now,
            updated_at: now,
        };
        routine.validate()?;
        Ok(routine)
    }

    /// Attach an identity, as storage does on first insert.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Check the field invariants.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_offset("sleep", self.sleep_offset_secs)?;
        check_offset("wake", self.wake_offset_secs)?;
        check_duration("pre_block", self.pre_block_secs)?;
        check_duration("post_block", self.post_block_secs)?;
        Ok(())
    }

    /// Start of blocking, `sleep - pre_block`, wrapped onto the day of `reference`.
    pub fn block_start_offset<Tz: TimeZone>(&self, reference: &DateTime<Tz>) -> CalendarOutcome<i64> {
        normalized_sum(self.sleep_offset_secs, -i128::from(self.pre_block_secs), reference)
    }

    /// End of blocking, `wake + post_block`, wrapped onto the day of `reference`.
    pub fn block_end_offset<Tz: TimeZone>(&self, reference: &DateTime<Tz>) -> CalendarOutcome<i64> {
        normalized_sum(self.wake_offset_secs, i128::from(self.post_block_secs), reference)
    }

    /// Whether the window wraps past midnight.
    pub fn crosses_midnight<Tz: TimeZone>(&self, reference: &DateTime<Tz>) -> bool {
        self.block_start_offset(reference).value() > self.block_end_offset(reference).value()
    }

    /// Whether blocking is in force at `at`, judged by its wall-clock time.
    ///
    /// A routine without buffers never blocks, nor does one whose start and
    /// end coincide. The start is inclusive and the end exclusive.
    pub fn is_blocking_active<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        if self.pre_block_secs <= 0 && self.post_block_secs <= 0 {
            return false;
        }

        let start = self.block_start_offset(at).value();
        let end = self.block_end_offset(at).value();
        if start == end {
            return false;
        }

        let now = wall_clock_offset(at);
        if start < end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }

    /// Apply an edit and bump `updated_at`. The identity is kept.
    ///
    /// # Errors
    /// Returns an error if the edited values are invalid; the routine is left unchanged.
    pub fn apply(&mut self, edit: RoutineEdit) -> Result<(), ValidationError> {
        let mut next = self.clone();
        if let Some(v) = edit.sleep_offset_secs {
            next.sleep_offset_secs = v;
        }
        if let Some(v) = edit.wake_offset_secs {
            next.wake_offset_secs = v;
        }
        if let Some(v) = edit.pre_block_secs {
            next.pre_block_secs = v;
        }
        if let Some(v) = edit.post_block_secs {
            next.post_block_secs = v;
        }
        if let Some(v) = edit.weekdays {
            next.weekdays = v;
        }
        next.validate()?;
        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }
}

/// Partial update for a routine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutineEdit {
    pub sleep_offset_secs: Option<i64>,
    pub wake_offset_secs: Option<i64>,
    pub pre_block_secs: Option<i64>,
    pub post_block_secs: Option<i64>,
    pub weekdays: Option<WeekdaySet>,
}

fn check_offset(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if (0..SECONDS_PER_DAY).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OffsetOutOfRange { field, value })
    }
}

fn check_duration(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value >= 0 {
        Ok(())
    } else {
        Err(ValidationError::NegativeDuration { field, value })
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`) into seconds after midnight.
///
/// # Errors
/// Returns an error for malformed or out-of-range times.
pub fn parse_clock_time(text: &str) -> Result<i64, ValidationError> {
    let invalid = || ValidationError::InvalidClockTime(text.to_string());
    let parts: Vec<&str> = text.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }

    let mut fields = [0i64; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part.parse::<i64>().map_err(|_| invalid())?;
    }
    let [hour, minute, second] = fields;
    if !(0..24).contains(&hour) || !(0..60).contains(&minute) || !(0..60).contains(&second) {
        return Err(invalid());
    }
    Ok(hour * 3600 + minute * 60 + second)
}

/// Format seconds after midnight as `HH:MM`, or `HH:MM:SS` when seconds are set.
pub fn format_clock_time(offset_secs: i64) -> String {
    let offset = offset_secs.rem_euclid(SECONDS_PER_DAY);
    let (hour, minute, second) = (offset / 3600, offset % 3600 / 60, offset % 60);
    if second == 0 {
        format!("{hour:02}:{minute:02}")
    } else {
        format!("{hour:02}:{minute:02}:{second:02}")
    }
}
