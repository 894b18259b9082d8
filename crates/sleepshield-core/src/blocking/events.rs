//! Interval start/end handling.
//!
//! When a monitored interval starts, the user's selection is applied to the
//! shield; when it ends, enforcement is cleared. [`MonitorEvents::sync`]
//! derives those edges from the wall clock for hosts without a platform
//! monitor that calls back on its own.

use chrono::{DateTime, Datelike, TimeZone};
use serde::Serialize;
use tracing::info;

use crate::calendar::wall_clock_offset;
use crate::error::StoreError;

use super::request::IntervalSchedule;
use super::shield::ShieldSettings;
use super::traits::{KeyValueStore, SelectionSource, ShieldStore};

/// Key holding the name of the interval last seen as active.
pub const CURRENT_INTERVAL_KEY: &str = "sleepshield.monitor.current";

/// What a [`MonitorEvents::sync`] call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "activity", rename_all = "snake_case")]
pub enum SyncOutcome {
    Started(String),
    Ended(String),
    Unchanged,
}

pub struct MonitorEvents<K, S, Sel> {
    store: K,
    shield: S,
    selection: Sel,
}

impl<K, S, Sel> MonitorEvents<K, S, Sel>
where
    K: KeyValueStore,
    S: ShieldStore,
    Sel: SelectionSource,
{
    pub fn new(store: K, shield: S, selection: Sel) -> Self {
        Self {
            store,
            shield,
            selection,
        }
    }

    /// Apply the current selection to the shield.
    ///
    /// # Errors
    /// Returns an error if the selection cannot be loaded or the shield written.
    pub fn interval_did_start(&self, activity: &str) -> Result<(), StoreError> {
        let selection = self.selection.load_selection()?;
        self.shield.set_shield(&ShieldSettings::from_selection(&selection))?;
        info!(activity, tokens = selection.len(), "interval started, shield applied");
        Ok(())
    }

    /// Clear every enforcement setting.
    ///
    /// # Errors
    /// Returns an error if the shield cannot be written.
    pub fn interval_did_end(&self, activity: &str) -> Result<(), StoreError> {
        self.shield.clear_all_settings()?;
        info!(activity, "interval ended, shield cleared");
        Ok(())
    }

    /// Fire start/end events for the interval containing `now`, if it changed.
    ///
    /// Only edges fire: calling this twice inside the same interval applies
    /// the shield once, so a pause within an interval holds until the next
    /// interval starts.
    ///
    /// # Errors
    /// Returns an error if the bookkeeping or the shield cannot be accessed.
    pub fn sync<Tz: TimeZone>(
        &self,
        registered: &[(String, IntervalSchedule)],
        now: &DateTime<Tz>,
    ) -> Result<SyncOutcome, StoreError> {
        let (weekday, offset) = (now.weekday(), wall_clock_offset(now));
        let current = registered
            .iter()
            .find(|(_, schedule)| schedule.contains(weekday, offset))
            .map(|(name, _)| name.clone());
        let previous = self
            .store
            .array(CURRENT_INTERVAL_KEY)?
            .and_then(|names| names.into_iter().next());

        match (previous, current) {
            (None, None) => Ok(SyncOutcome::Unchanged),
            (Some(previous), Some(current)) if previous == current => Ok(SyncOutcome::Unchanged),
            (previous, Some(current)) => {
                if let Some(previous) = previous {
                    self.interval_did_end(&previous)?;
                }
                self.interval_did_start(&current)?;
                self.store
                    .set_array(CURRENT_INTERVAL_KEY, std::slice::from_ref(&current))?;
                Ok(SyncOutcome::Started(current))
            }
            (Some(previous), None) => {
                self.interval_did_end(&previous)?;
                self.store.remove(CURRENT_INTERVAL_KEY)?;
                Ok(SyncOutcome::Ended(previous))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::memory::{MemoryShield, MemoryStore};
    use crate::blocking::request::TimeComponents;
    use crate::blocking::shield::ActivitySelection;
    use chrono::{Utc, Weekday};
    use std::collections::BTreeSet;

    fn selection() -> ActivitySelection {
        ActivitySelection {
            applications: BTreeSet::from(["app.video".to_string()]),
            categories: BTreeSet::from(["cat.games".to_string()]),
            web_domains: BTreeSet::new(),
        }
    }

    // 2026-06-08 is a Monday.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 8, h, m, 0).single().unwrap()
    }

    fn tuesday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 9, h, m, 0).single().unwrap()
    }

    fn overnight() -> Vec<(String, IntervalSchedule)> {
        vec![
            (
                "p.r1.d2.s0".into(),
                IntervalSchedule::weekly(
                    TimeComponents::new(Weekday::Mon, 22, 0, 0),
                    TimeComponents::end_of_day(Weekday::Mon),
                ),
            ),
            (
                "p.r1.d3.s1".into(),
                IntervalSchedule::weekly(
                    TimeComponents::midnight(Weekday::Tue),
                    TimeComponents::new(Weekday::Tue, 7, 30, 0),
                ),
            ),
        ]
    }

    #[test]
    fn start_applies_selection_and_end_clears() {
        let (store, shield) = (MemoryStore::new(), MemoryShield::with_selection(selection()));
        let events = MonitorEvents::new(&store, &shield, &shield);

        events.interval_did_start("p.r1.d2.s0").unwrap();
        let applied = shield.shield().unwrap();
        assert!(applied.applications.contains("app.video"));
        assert!(applied.web_domain_categories.contains("cat.games"));

        events.interval_did_end("p.r1.d2.s0").unwrap();
        assert!(!shield.shield().unwrap().is_enforcing());
    }

    #[test]
    fn sync_fires_only_on_edges() {
        let (store, shield) = (MemoryStore::new(), MemoryShield::with_selection(selection()));
        let events = MonitorEvents::new(&store, &shield, &shield);
        let registered = overnight();

        assert_eq!(events.sync(&registered, &monday(21, 0)).unwrap(), SyncOutcome::Unchanged);
        assert_eq!(
            events.sync(&registered, &monday(22, 30)).unwrap(),
            SyncOutcome::Started("p.r1.d2.s0".into())
        );

        shield.clear_all_settings().unwrap();
        assert_eq!(events.sync(&registered, &monday(23, 0)).unwrap(), SyncOutcome::Unchanged);
        assert!(!shield.shield().unwrap().is_enforcing(), "pause holds inside an interval");

        assert_eq!(
            events.sync(&registered, &tuesday(1, 0)).unwrap(),
            SyncOutcome::Started("p.r1.d3.s1".into())
        );
        assert!(shield.shield().unwrap().is_enforcing());

        assert_eq!(
            events.sync(&registered, &tuesday(8, 0)).unwrap(),
            SyncOutcome::Ended("p.r1.d3.s1".into())
        );
        assert!(!shield.shield().unwrap().is_enforcing());
        assert_eq!(store.array(CURRENT_INTERVAL_KEY).unwrap(), None);
    }

    #[test]
    fn sync_ends_an_interval_that_was_unregistered() {
        let (store, shield) = (MemoryStore::new(), MemoryShield::with_selection(selection()));
        let events = MonitorEvents::new(&store, &shield, &shield);
        events.sync(&overnight(), &monday(23, 0)).unwrap();

        let outcome = events.sync(&[], &monday(23, 5)).unwrap();

        assert_eq!(outcome, SyncOutcome::Ended("p.r1.d2.s0".into()));
        assert!(!shield.shield().unwrap().is_enforcing());
    }
}
