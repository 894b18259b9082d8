//! # SleepShield Core Library
//!
//! This library provides the core logic for SleepShield: it keeps a sleep
//! routine and turns its daily blocking window into weekly monitored
//! intervals, during which the user's blocked selection is enforced. All
//! operations are available via the standalone `sleepshield` CLI binary.
//!
//! ## Architecture
//!
//! - **Weekdays**: A Sunday-first weekday bitset used for routines and alarms
//! - **Calendar**: DST-aware day lengths with explicit, observable fallbacks
//! - **Blocking**: Request derivation, the all-or-nothing scheduler, and
//!   interval start/end handling over injected collaborators
//! - **Storage**: SQLite-based persistence and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`WeekdaySet`]: Set of repeat days
//! - [`SleepRoutine`]: Sleep and wake times with blocking buffers
//! - [`BlockingScheduler`]: Registers and tears down blocking windows
//! - [`Database`]: Persistence and the local activity registry
//! - [`Config`]: Application configuration management

pub mod alarm;
pub mod blocking;
pub mod calendar;
pub mod error;
pub mod routine;
pub mod storage;
pub mod weekday;

pub use alarm::{Alarm, AlarmBook};
pub use blocking::{
    ActivityMonitor, ActivitySelection, BlockingConfig, BlockingScheduler, IntervalSchedule, KeyValueStore,
    MonitorEvents, RequestKey, ScheduleRequest, SelectionSource, ShieldSettings, ShieldStore, SyncOutcome,
    TimeComponents,
};
pub use calendar::CalendarOutcome;
pub use error::{BlockingError, ConfigError, CoreError, DatabaseError, MonitorError, StoreError, ValidationError};
pub use routine::{format_clock_time, parse_clock_time, RoutineEdit, SleepRoutine};
pub use storage::{ActivityRegistry, Config, Database};
pub use weekday::WeekdaySet;
