//! Collaborators the blocking scheduler drives.
//!
//! All methods take `&self`: implementations are expected to be used from a
//! single serial context and reach for interior mutability (a SQLite
//! connection, a `RefCell`) when they need to write.

use crate::error::{MonitorError, StoreError};

use super::request::IntervalSchedule;
use super::shield::{ActivitySelection, ShieldSettings};

/// Registers named weekly intervals with the platform's activity monitor.
pub trait ActivityMonitor {
    /// Begin monitoring `name` during `schedule`.
    fn start_monitoring(&self, name: &str, schedule: &IntervalSchedule) -> Result<(), MonitorError>;

    /// Stop monitoring the given names. Unknown names are ignored.
    fn stop_monitoring(&self, names: &[String]);

    /// Names currently monitored.
    fn activities(&self) -> Vec<String>;
}

/// Persistent string-array store used for request bookkeeping.
pub trait KeyValueStore {
    fn set_array(&self, key: &str, values: &[String]) -> Result<(), StoreError>;

    fn array(&self, key: &str) -> Result<Option<Vec<String>>, StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// The enforcement configuration currently applied on the device.
pub trait ShieldStore {
    fn shield(&self) -> Result<ShieldSettings, StoreError>;

    fn set_shield(&self, settings: &ShieldSettings) -> Result<(), StoreError>;

    /// Reset every enforcement setting.
    fn clear_all_settings(&self) -> Result<(), StoreError> {
        self.set_shield(&ShieldSettings::default())
    }
}

/// Source of the user's blocked selection.
pub trait SelectionSource {
    fn load_selection(&self) -> Result<ActivitySelection, StoreError>;

    fn save_selection(&self, selection: &ActivitySelection) -> Result<(), StoreError>;
}

impl<T: ActivityMonitor + ?Sized> ActivityMonitor for &T {
    fn start_monitoring(&self, name: &str, schedule: &IntervalSchedule) -> Result<(), MonitorError> {
        (**self).start_monitoring(name, schedule)
    }

    fn stop_monitoring(&self, names: &[String]) {
        (**self).stop_monitoring(names)
    }

    fn activities(&self) -> Vec<String> {
        (**self).activities()
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn set_array(&self, key: &str, values: &[String]) -> Result<(), StoreError> {
        (**self).set_array(key, values)
    }

    fn array(&self, key: &str) -> Result<Option<Vec<String>>, StoreError> {
        (**self).array(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).keys_with_prefix(prefix)
    }
}

impl<T: ShieldStore + ?Sized> ShieldStore for &T {
    fn shield(&self) -> Result<ShieldSettings, StoreError> {
        (**self).shield()
    }

    fn set_shield(&self, settings: &ShieldSettings) -> Result<(), StoreError> {
        (**self).set_shield(settings)
    }

    fn clear_all_settings(&self) -> Result<(), StoreError> {
        (**self).clear_all_settings()
    }
}

impl<T: SelectionSource + ?Sized> SelectionSource for &T {
    fn load_selection(&self) -> Result<ActivitySelection, StoreError> {
        (**self).load_selection()
    }

    fn save_selection(&self, selection: &ActivitySelection) -> Result<(), StoreError> {
        (**self).save_selection(selection)
    }
}
