//! Blocking-window scheduling.
//!
//! A routine's daily window becomes one or two weekly interval requests
//! per selected weekday ([`request`]). The [`scheduler`] registers them with
//! an [`ActivityMonitor`] and records their names; [`events`] applies and
//! clears the shield as intervals start and end.

pub mod events;
pub mod memory;
pub mod request;
pub mod scheduler;
pub mod shield;
pub mod traits;

pub use events::{MonitorEvents, SyncOutcome, CURRENT_INTERVAL_KEY};
pub use memory::{MemoryMonitor, MemoryShield, MemoryStore};
pub use request::{
    derive_requests, sanitize_identifier, time_components, weekday_number, IntervalSchedule, RequestKey,
    ScheduleRequest, TimeComponents,
};
pub use scheduler::{BlockingConfig, BlockingScheduler};
pub use shield::{ActivitySelection, ShieldSettings};
pub use traits::{ActivityMonitor, KeyValueStore, SelectionSource, ShieldStore};
