//! In-memory collaborators.
//!
//! Test doubles and dry-run backends. They follow the same rules as the
//! SQLite-backed implementations: duplicate names are rejected and stopping
//! an unknown name is a no-op.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::error::{MonitorError, StoreError};

use super::request::IntervalSchedule;
use super::shield::{ActivitySelection, ShieldSettings};
use super::traits::{ActivityMonitor, KeyValueStore, SelectionSource, ShieldStore};

/// Activity monitor that keeps registrations in registration order.
#[derive(Debug, Default)]
pub struct MemoryMonitor {
    active: RefCell<Vec<(String, IntervalSchedule)>>,
    stopped: RefCell<Vec<Vec<String>>>,
    start_calls: Cell<usize>,
    fail_at: Option<usize>,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A monitor whose `call`-th start request (1-based) fails.
    pub fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::default()
        }
    }

    /// Number of start requests received, including failed ones.
    pub fn start_calls(&self) -> usize {
        self.start_calls.get()
    }

    /// Every argument passed to `stop_monitoring`, oldest first.
    pub fn stopped_batches(&self) -> Vec<Vec<String>> {
        self.stopped.borrow().clone()
    }

    /// Registered intervals with their names.
    pub fn registered(&self) -> Vec<(String, IntervalSchedule)> {
        self.active.borrow().clone()
    }
}

impl ActivityMonitor for MemoryMonitor {
    fn start_monitoring(&self, name: &str, schedule: &IntervalSchedule) -> Result<(), MonitorError> {
        let call = self.start_calls.get() + 1;
        self.start_calls.set(call);
        if self.fail_at == Some(call) {
            return Err(MonitorError::Backend(format!("injected failure on call {call}")));
        }

        let mut active = self.active.borrow_mut();
        if active.iter().any(|(existing, _)| existing == name) {
            return Err(MonitorError::DuplicateName(name.to_string()));
        }
        active.push((name.to_string(), *schedule));
        Ok(())
    }

    fn stop_monitoring(&self, names: &[String]) {
        self.stopped.borrow_mut().push(names.to_vec());
        self.active
            .borrow_mut()
            .retain(|(name, _)| !names.contains(name));
    }

    fn activities(&self) -> Vec<String> {
        self.active.borrow().iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Ordered in-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, Vec<String>>>,
    fail_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until switched off.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            Err(StoreError::Backend("store is read-only".into()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn set_array(&self, key: &str, values: &[String]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries.borrow_mut().insert(key.to_string(), values.to_vec());
        Ok(())
    }

    fn array(&self, key: &str) -> Result<Option<Vec<String>>, StoreError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .borrow()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Shield and selection held in memory.
#[derive(Debug, Default)]
pub struct MemoryShield {
    settings: RefCell<ShieldSettings>,
    selection: RefCell<ActivitySelection>,
}

impl MemoryShield {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selection(selection: ActivitySelection) -> Self {
        Self {
            selection: RefCell::new(selection),
            ..Self::default()
        }
    }
}

impl ShieldStore for MemoryShield {
    fn shield(&self) -> Result<ShieldSettings, StoreError> {
        Ok(self.settings.borrow().clone())
    }

    fn set_shield(&self, settings: &ShieldSettings) -> Result<(), StoreError> {
        *self.settings.borrow_mut() = settings.clone();
        Ok(())
    }
}

impl SelectionSource for MemoryShield {
    fn load_selection(&self) -> Result<ActivitySelection, StoreError> {
        Ok(self.selection.borrow().clone())
    }

    fn save_selection(&self, selection: &ActivitySelection) -> Result<(), StoreError> {
        *self.selection.borrow_mut() = selection.clone();
        Ok(())
    }
}
