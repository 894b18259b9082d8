//! Blocking-window scheduler.
//!
//! Owns the round trip between a routine and the activity monitor:
//! derive the routine's requests, register them as one batch, and record
//! the registered names under the routine's identity so that a later call
//! can cancel exactly that set.
//!
//! ## Batch semantics
//!
//! ```text
//! cancel persisted names -> derive -> register each --ok--> persist names
//!                                          |
//!                                        error -> stop names started in this batch -> Err
//! ```
//!
//! A routine is never left half-scheduled.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::BlockingError;
use crate::routine::SleepRoutine;

use super::request::{derive_requests, ScheduleRequest};
use super::traits::{ActivityMonitor, KeyValueStore, ShieldStore};

/// Naming configuration for monitored activities and their bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// Prefix of every activity name handed to the monitor.
    #[serde(default = "default_activity_prefix")]
    pub activity_prefix: String,
    /// Prefix of the key-value entries that record registered names.
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,
    /// Cap enforced by the local activity registry.
    #[serde(default = "default_max_monitored_activities")]
    pub max_monitored_activities: usize,
}

fn default_activity_prefix() -> String {
    "sleepshield.blocking".into()
}

fn default_storage_prefix() -> String {
    "sleepshield.appBlocking.names".into()
}

fn default_max_monitored_activities() -> usize {
    20
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            activity_prefix: default_activity_prefix(),
            storage_prefix: default_storage_prefix(),
            max_monitored_activities: default_max_monitored_activities(),
        }
    }
}

/// Schedules and tears down blocking windows for sleep routines.
pub struct BlockingScheduler<M, K, S, Tz: TimeZone> {
    monitor: M,
    store: K,
    shield: S,
    tz: Tz,
    config: BlockingConfig,
    /// Pinned "now" used for calendar lookups; the system clock when unset.
    reference_time: Option<DateTime<Tz>>,
}

impl<M, K, S, Tz> BlockingScheduler<M, K, S, Tz>
where
    M: ActivityMonitor,
    K: KeyValueStore,
    S: ShieldStore,
    Tz: TimeZone,
{
    pub fn new(monitor: M, store: K, shield: S, tz: Tz, config: BlockingConfig) -> Self {
        Self {
            monitor,
            store,
            shield,
            tz,
            config,
            reference_time: None,
        }
    }

    /// Pin the instant used as "today" for calendar lookups.
    pub fn with_reference_time(mut self, reference: DateTime<Tz>) -> Self {
        self.reference_time = Some(reference);
        self
    }

    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn shield(&self) -> &S {
        &self.shield
    }

    pub fn config(&self) -> &BlockingConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Tz> {
        self.reference_time
            .clone()
            .unwrap_or_else(|| Utc::now().with_timezone(&self.tz))
    }

    fn identity(routine: &SleepRoutine) -> Result<&str, BlockingError> {
        match routine.id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(BlockingError::MissingIdentity),
        }
    }

    fn storage_key(&self, identity: &str) -> String {
        format!("{}.{identity}", self.config.storage_prefix)
    }

    /// Requests the routine would register, without registering them.
    ///
    /// # Errors
    /// Returns [`BlockingError::MissingIdentity`] for an unsaved routine.
    pub fn requests_for(&self, routine: &SleepRoutine) -> Result<Vec<ScheduleRequest>, BlockingError> {
        let identity = Self::identity(routine)?;
        Ok(self.derive(routine, identity))
    }

    fn derive(&self, routine: &SleepRoutine, identity: &str) -> Vec<ScheduleRequest> {
        let requests = derive_requests(routine, identity, &self.now());
        for request in requests.iter().filter(|r| r.degraded) {
            warn!(
                routine = identity,
                activity = %request.key.activity_name(&self.config.activity_prefix),
                "calendar lookup fell back to a fixed-length day"
            );
        }
        requests
    }

    /// Register the routine's blocking window, replacing any earlier registration.
    ///
    /// Returns the registered activity names. A routine with no weekdays
    /// registers nothing and records an empty list.
    ///
    /// # Errors
    /// Returns [`BlockingError::MissingIdentity`] for an unsaved routine,
    /// [`BlockingError::Registration`] after rolling back when the monitor
    /// rejects a request, and [`BlockingError::Store`] when bookkeeping fails.
    pub fn schedule_blocking(&self, routine: &SleepRoutine) -> Result<Vec<String>, BlockingError> {
        let identity = Self::identity(routine)?;
        self.remove_persisted_schedules(identity)?;

        let requests = self.derive(routine, identity);
        let names = self.register_batch(identity, &requests)?;
        info!(routine = identity, count = names.len(), "blocking scheduled");
        Ok(names)
    }

    /// Re-register the same window after the blocked selection changed.
    ///
    /// Enforcement currently applied is cleared first; the next interval
    /// start applies the new selection.
    ///
    /// # Errors
    /// Same as [`BlockingScheduler::schedule_blocking`].
    pub fn update_blocking_selection(&self, routine: &SleepRoutine) -> Result<Vec<String>, BlockingError> {
        let identity = Self::identity(routine)?;
        self.shield.clear_all_settings()?;

        let requests = self.derive(routine, identity);
        self.remove_persisted_schedules(identity)?;
        let names = self.register_batch(identity, &requests)?;
        info!(routine = identity, count = names.len(), "blocking selection updated");
        Ok(names)
    }

    /// Cancel this routine's registered intervals. Other routines are untouched.
    ///
    /// # Errors
    /// Returns [`BlockingError::MissingIdentity`] for an unsaved routine or
    /// [`BlockingError::Store`] when bookkeeping fails.
    pub fn stop_blocking(&self, routine: &SleepRoutine) -> Result<(), BlockingError> {
        let identity = Self::identity(routine)?;
        self.remove_persisted_schedules(identity)?;
        info!(routine = identity, "blocking stopped");
        Ok(())
    }

    /// Cancel an explicit list of activity names.
    pub fn stop_blocking_names(&self, names: &[String]) {
        self.monitor.stop_monitoring(names);
    }

    /// Lift the shield until the next monitored interval starts.
    ///
    /// Registrations are kept.
    ///
    /// # Errors
    /// Returns an error if the shield store cannot be read or written.
    pub fn pause_blocking(&self) -> Result<(), BlockingError> {
        let mut settings = self.shield.shield()?;
        settings.applications.clear();
        settings.application_categories.clear();
        settings.web_domains.clear();
        settings.web_domain_categories.clear();
        self.shield.set_shield(&settings)?;
        info!("blocking paused until the next interval starts");
        Ok(())
    }

    /// Stop every monitored activity and forget every recorded name list.
    ///
    /// # Errors
    /// Returns an error if the bookkeeping cannot be listed or removed.
    pub fn stop_all_blocking(&self) -> Result<(), BlockingError> {
        let keys = self
            .store
            .keys_with_prefix(&format!("{}.", self.config.storage_prefix))?;

        let active = self.monitor.activities();
        self.monitor.stop_monitoring(&active);
        for key in &keys {
            self.store.remove(key)?;
        }
        info!(activities = active.len(), routines = keys.len(), "all blocking stopped");
        Ok(())
    }

    /// Whether the shield is enforcing anything right now.
    ///
    /// # Errors
    /// Returns an error if the shield store cannot be read.
    pub fn blocking_is_activated(&self) -> Result<bool, BlockingError> {
        Ok(self.shield.shield()?.is_enforcing())
    }

    /// Names recorded for the routine by the last successful schedule call.
    ///
    /// # Errors
    /// Returns [`BlockingError::MissingIdentity`] for an unsaved routine or
    /// [`BlockingError::Store`] when bookkeeping cannot be read.
    pub fn persisted_names(&self, routine: &SleepRoutine) -> Result<Vec<String>, BlockingError> {
        let identity = Self::identity(routine)?;
        Ok(self.store.array(&self.storage_key(identity))?.unwrap_or_default())
    }

    fn register_batch(&self, identity: &str, requests: &[ScheduleRequest]) -> Result<Vec<String>, BlockingError> {
        let mut started: Vec<String> = Vec::with_capacity(requests.len());

        for request in requests {
            let name = request.key.activity_name(&self.config.activity_prefix);
            if let Err(source) = self.monitor.start_monitoring(&name, &request.schedule) {
                error!(
                    routine = identity,
                    activity = %name,
                    rolled_back = started.len(),
                    error = %source,
                    "registration failed, rolling back batch"
                );
                self.monitor.stop_monitoring(&started);
                return Err(BlockingError::Registration { name, source });
            }
            debug!(routine = identity, activity = %name, "activity registered");
            started.push(name);
        }

        if let Err(err) = self.store.set_array(&self.storage_key(identity), &started) {
            // Unrecorded intervals could never be cancelled by name later.
            error!(routine = identity, error = %err, "failed to record activity names, rolling back batch");
            self.monitor.stop_monitoring(&started);
            return Err(err.into());
        }
        Ok(started)
    }

    fn remove_persisted_schedules(&self, identity: &str) -> Result<(), BlockingError> {
        let key = self.storage_key(identity);
        if let Some(names) = self.store.array(&key)? {
            debug!(routine = identity, count = names.len(), "cancelling recorded activities");
            self.monitor.stop_monitoring(&names);
        }
        self.store.remove(&key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::memory::{MemoryMonitor, MemoryShield, MemoryStore};
    use crate::blocking::shield::{ActivitySelection, ShieldSettings};
    use crate::weekday::WeekdaySet;
    use chrono::Weekday;
    use std::collections::BTreeSet;

    type TestScheduler<'a> = BlockingScheduler<&'a MemoryMonitor, &'a MemoryStore, &'a MemoryShield, Utc>;

    fn scheduler<'a>(monitor: &'a MemoryMonitor, store: &'a MemoryStore, shield: &'a MemoryShield) -> TestScheduler<'a> {
        let reference = Utc.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).single().unwrap();
        BlockingScheduler::new(monitor, store, shield, Utc, BlockingConfig::default()).with_reference_time(reference)
    }

    fn overnight(days: WeekdaySet) -> SleepRoutine {
        SleepRoutine::new(82_800, 25_200, 3_600, 1_800, days).unwrap().with_id("r1")
    }

    fn enforcing() -> ShieldSettings {
        ShieldSettings::from_selection(&ActivitySelection {
            applications: BTreeSet::from(["app".to_string()]),
            ..Default::default()
        })
    }

    #[test]
    fn schedule_registers_and_records_names() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);

        let names = scheduler.schedule_blocking(&overnight(WeekdaySet::single(Weekday::Mon))).unwrap();

        assert_eq!(
            names,
            vec!["sleepshield.blocking.r1.d2.s0".to_string(), "sleepshield.blocking.r1.d3.s1".to_string()]
        );
        assert_eq!(monitor.activities(), names);
        assert_eq!(
            store.array("sleepshield.appBlocking.names.r1").unwrap(),
            Some(names.clone())
        );
    }

    #[test]
    fn degraded_calendar_still_schedules() {
        use crate::calendar::skipped_mornings::SkippedMornings;

        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let reference = SkippedMornings.with_ymd_and_hms(2026, 6, 10, 9, 0, 0).single().unwrap();
        let scheduler = BlockingScheduler::new(&monitor, &store, &shield, SkippedMornings, BlockingConfig::default())
            .with_reference_time(reference);
        let routine = overnight(WeekdaySet::single(Weekday::Mon));

        let requests = scheduler.requests_for(&routine).unwrap();
        assert!(requests.iter().all(|r| r.degraded));

        let names = scheduler.schedule_blocking(&routine).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(monitor.activities(), names);
    }

    #[test]
    fn oversized_buffers_schedule_without_panicking() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);
        let routine = SleepRoutine::new(82_800, 25_200, i64::MAX, i64::MAX, WeekdaySet::EVERYDAY)
            .unwrap()
            .with_id("r1");

        let names = scheduler.schedule_blocking(&routine).unwrap();
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn unsaved_routine_is_rejected() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);
        let routine = SleepRoutine::new(82_800, 25_200, 0, 0, WeekdaySet::EVERYDAY).unwrap();

        assert!(matches!(scheduler.schedule_blocking(&routine), Err(BlockingError::MissingIdentity)));
        assert!(matches!(scheduler.stop_blocking(&routine), Err(BlockingError::MissingIdentity)));
        assert!(matches!(
            scheduler.update_blocking_selection(&routine),
            Err(BlockingError::MissingIdentity)
        ));
        assert_eq!(monitor.start_calls(), 0);
    }

    #[test]
    fn empty_weekdays_record_an_empty_list_without_monitor_calls() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);

        let names = scheduler.schedule_blocking(&overnight(WeekdaySet::EMPTY)).unwrap();

        assert!(names.is_empty());
        assert_eq!(monitor.start_calls(), 0);
        assert_eq!(store.array("sleepshield.appBlocking.names.r1").unwrap(), Some(vec![]));
    }

    #[test]
    fn failure_rolls_back_started_requests() {
        let (monitor, store, shield) = (MemoryMonitor::failing_at(3), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);

        let err = scheduler.schedule_blocking(&overnight(WeekdaySet::WEEKDAYS)).unwrap_err();

        match err {
            BlockingError::Registration { name, .. } => assert_eq!(name, "sleepshield.blocking.r1.d3.s0"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(monitor.activities().is_empty());
        assert_eq!(monitor.stopped_batches().last().map(Vec::len), Some(2));
        assert_eq!(store.array("sleepshield.appBlocking.names.r1").unwrap(), None);
    }

    #[test]
    fn record_failure_rolls_back_the_batch() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        store.fail_writes(true);
        let scheduler = scheduler(&monitor, &store, &shield);

        let err = scheduler.schedule_blocking(&overnight(WeekdaySet::single(Weekday::Fri))).unwrap_err();

        assert!(matches!(err, BlockingError::Store(_)));
        assert!(monitor.activities().is_empty());
    }

    #[test]
    fn rescheduling_replaces_the_previous_window() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);
        let mut routine = overnight(WeekdaySet::EVERYDAY);
        scheduler.schedule_blocking(&routine).unwrap();

        routine.weekdays = WeekdaySet::single(Weekday::Wed);
        routine.sleep_offset_secs = 36_000;
        routine.wake_offset_secs = 43_200;
        let names = scheduler.schedule_blocking(&routine).unwrap();

        assert_eq!(names, vec!["sleepshield.blocking.r1.d4.s0".to_string()]);
        assert_eq!(monitor.activities(), names);
    }

    #[test]
    fn stop_only_touches_the_given_routine() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);
        let first = overnight(WeekdaySet::single(Weekday::Mon));
        let second = overnight(WeekdaySet::single(Weekday::Thu)).with_id("r2");
        scheduler.schedule_blocking(&first).unwrap();
        let kept = scheduler.schedule_blocking(&second).unwrap();

        scheduler.stop_blocking(&first).unwrap();

        assert_eq!(monitor.activities(), kept);
        assert_eq!(scheduler.persisted_names(&first).unwrap(), Vec::<String>::new());
        assert_eq!(scheduler.persisted_names(&second).unwrap(), kept);
    }

    #[test]
    fn stop_all_clears_every_routine() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);
        scheduler.schedule_blocking(&overnight(WeekdaySet::WEEKEND)).unwrap();
        scheduler
            .schedule_blocking(&overnight(WeekdaySet::WEEKDAYS).with_id("r2"))
            .unwrap();
        store.set_array("unrelated", &["keep".to_string()]).unwrap();

        scheduler.stop_all_blocking().unwrap();

        assert!(monitor.activities().is_empty());
        assert!(store.keys_with_prefix("sleepshield.appBlocking.names.").unwrap().is_empty());
        assert!(store.array("unrelated").unwrap().is_some());
    }

    #[test]
    fn pause_clears_shield_but_keeps_registrations() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);
        let names = scheduler.schedule_blocking(&overnight(WeekdaySet::EVERYDAY)).unwrap();
        shield.set_shield(&enforcing()).unwrap();
        assert!(scheduler.blocking_is_activated().unwrap());

        scheduler.pause_blocking().unwrap();

        assert!(!scheduler.blocking_is_activated().unwrap());
        assert_eq!(monitor.activities().len(), names.len());
    }

    #[test]
    fn update_selection_clears_shield_and_reregisters() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);
        let routine = overnight(WeekdaySet::single(Weekday::Sun));
        let first = scheduler.schedule_blocking(&routine).unwrap();
        shield.set_shield(&enforcing()).unwrap();

        let second = scheduler.update_blocking_selection(&routine).unwrap();

        assert_eq!(first, second);
        assert_eq!(monitor.activities(), second);
        assert!(!scheduler.blocking_is_activated().unwrap());
    }

    #[test]
    fn stop_names_cancels_explicit_activities() {
        let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
        let scheduler = scheduler(&monitor, &store, &shield);
        let names = scheduler.schedule_blocking(&overnight(WeekdaySet::single(Weekday::Mon))).unwrap();

        scheduler.stop_blocking_names(&names[..1]);

        assert_eq!(monitor.activities(), names[1..].to_vec());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rescheduling_is_idempotent(
                sleep in 0i64..86_400,
                wake in 0i64..86_400,
                pre in 0i64..7_200,
                post in 0i64..7_200,
                bits in 0u8..128,
            ) {
                let (monitor, store, shield) = (MemoryMonitor::new(), MemoryStore::new(), MemoryShield::new());
                let scheduler = scheduler(&monitor, &store, &shield);
                let routine = SleepRoutine::new(sleep, wake, pre, post, WeekdaySet::from_bits_truncate(bits))
                    .unwrap()
                    .with_id("r1");

                let once = scheduler.schedule_blocking(&routine).unwrap();
                let registered_once = monitor.registered();
                let twice = scheduler.schedule_blocking(&routine).unwrap();

                prop_assert_eq!(&once, &twice);
                prop_assert_eq!(registered_once, monitor.registered());
                prop_assert_eq!(scheduler.persisted_names(&routine).unwrap(), twice);
            }
        }
    }
}
