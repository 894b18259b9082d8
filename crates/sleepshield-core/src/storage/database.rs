//! SQLite-based storage.
//!
//! Provides persistent storage for:
//! - Sleep routines and wake alarms
//! - Key-value store for blocking bookkeeping, the applied shield and the
//!   blocked selection
//! - The local activity registry (see [`super::ActivityRegistry`])

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::alarm::Alarm;
use crate::blocking::{ActivitySelection, KeyValueStore, SelectionSource, ShieldSettings, ShieldStore};
use crate::error::{CoreError, DatabaseError, StoreError};
use crate::routine::SleepRoutine;
use crate::weekday::WeekdaySet;

use super::{data_dir, migrations};

/// kv key of the enforcement currently applied.
pub const SHIELD_KEY: &str = "sleepshield.shield";

/// kv key of the user's blocked selection.
pub const SELECTION_KEY: &str = "sleepshield.familyActivitySelection";

/// SQLite database for routines, alarms and blocking state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/sleepshield.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created or the
    /// database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("sleepshield.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(|source| DatabaseError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // ── key-value ───────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a key from the kv store. Missing keys are ignored.
    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Keys starting with `prefix`, sorted.
    pub fn kv_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn kv_get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.kv_get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn kv_set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.kv_set(key, &serde_json::to_string(value)?)?;
        Ok(())
    }

    // ── routines ────────────────────────────────────────────────────────

    /// Persist a new routine, assigning an identity if it has none.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_routine(&self, routine: &SleepRoutine) -> Result<SleepRoutine, DatabaseError> {
        let mut saved = routine.clone();
        if saved.id.as_deref().map_or(true, str::is_empty) {
            saved.id = Some(Uuid::new_v4().to_string());
        }
        self.conn.execute(
            "INSERT INTO routines (id, sleep_offset_secs, wake_offset_secs, pre_block_secs,
                                   post_block_secs, weekdays, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                saved.id,
                saved.sleep_offset_secs,
                saved.wake_offset_secs,
                saved.pre_block_secs,
                saved.post_block_secs,
                saved.weekdays.bits(),
                saved.created_at.to_rfc3339(),
                saved.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(saved)
    }

    /// Overwrite a persisted routine.
    ///
    /// # Errors
    /// Returns [`DatabaseError::NotFound`] if the routine was never persisted.
    pub fn update_routine(&self, routine: &SleepRoutine) -> Result<(), DatabaseError> {
        let id = routine.id.clone().unwrap_or_default();
        let changed = self.conn.execute(
            "UPDATE routines
             SET sleep_offset_secs = ?2, wake_offset_secs = ?3, pre_block_secs = ?4,
                 post_block_secs = ?5, weekdays = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                routine.sleep_offset_secs,
                routine.wake_offset_secs,
                routine.pre_block_secs,
                routine.post_block_secs,
                routine.weekdays.bits(),
                routine.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "routine", id });
        }
        Ok(())
    }

    pub fn get_routine(&self, id: &str) -> Result<Option<SleepRoutine>, DatabaseError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, sleep_offset_secs, wake_offset_secs, pre_block_secs, post_block_secs,
                        weekdays, created_at, updated_at
                 FROM routines WHERE id = ?1",
                params![id],
                routine_from_row,
            )
            .optional()?)
    }

    /// All routines, oldest first.
    pub fn list_routines(&self) -> Result<Vec<SleepRoutine>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sleep_offset_secs, wake_offset_secs, pre_block_secs, post_block_secs,
                    weekdays, created_at, updated_at
             FROM routines ORDER BY created_at, id",
        )?;
        let routines = stmt
            .query_map([], routine_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(routines)
    }

    /// Delete a routine. Returns whether a row was removed.
    ///
    /// Callers tear down the routine's blocking schedule first.
    pub fn delete_routine(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.conn.execute("DELETE FROM routines WHERE id = ?1", params![id])? > 0)
    }

    // ── alarms ──────────────────────────────────────────────────────────

    pub fn insert_alarm(&self, alarm: &Alarm) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO alarms (id, hour, minute, weekdays, label, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                alarm.id,
                alarm.hour,
                alarm.minute,
                alarm.weekdays.bits(),
                alarm.label,
                alarm.enabled,
                alarm.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// # Errors
    /// Returns [`DatabaseError::NotFound`] for an unknown alarm.
    pub fn update_alarm(&self, alarm: &Alarm) -> Result<(), DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE alarms SET hour = ?2, minute = ?3, weekdays = ?4, label = ?5, enabled = ?6
             WHERE id = ?1",
            params![
                alarm.id,
                alarm.hour,
                alarm.minute,
                alarm.weekdays.bits(),
                alarm.label,
                alarm.enabled,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "alarm",
                id: alarm.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_alarm(&self, id: &str) -> Result<Option<Alarm>, DatabaseError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, hour, minute, weekdays, label, enabled, created_at FROM alarms WHERE id = ?1",
                params![id],
                alarm_from_row,
            )
            .optional()?)
    }

    /// All alarms ordered by time of day.
    pub fn list_alarms(&self) -> Result<Vec<Alarm>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, hour, minute, weekdays, label, enabled, created_at
             FROM alarms ORDER BY hour, minute, created_at",
        )?;
        let alarms = stmt
            .query_map([], alarm_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alarms)
    }

    pub fn delete_alarm(&self, id: &str) -> Result<bool, DatabaseError> {
        Ok(self.conn.execute("DELETE FROM alarms WHERE id = ?1", params![id])? > 0)
    }
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn weekdays_from_column(bits: i64) -> WeekdaySet {
    WeekdaySet::from_bits_truncate((bits & 0x7f) as u8)
}

fn routine_from_row(row: &Row<'_>) -> rusqlite::Result<SleepRoutine> {
    Ok(SleepRoutine {
        id: Some(row.get(0)?),
        sleep_offset_secs: row.get(1)?,
        wake_offset_secs: row.get(2)?,
        pre_block_secs: row.get(3)?,
        post_block_secs: row.get(4)?,
        weekdays: weekdays_from_column(row.get(5)?),
        created_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

fn alarm_from_row(row: &Row<'_>) -> rusqlite::Result<Alarm> {
    Ok(Alarm {
        id: row.get(0)?,
        hour: row.get(1)?,
        minute: row.get(2)?,
        weekdays: weekdays_from_column(row.get(3)?),
        label: row.get(4)?,
        enabled: row.get(5)?,
        created_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
    })
}

impl KeyValueStore for Database {
    fn set_array(&self, key: &str, values: &[String]) -> Result<(), StoreError> {
        self.kv_set_json(key, &values)
    }

    fn array(&self, key: &str) -> Result<Option<Vec<String>>, StoreError> {
        self.kv_get_json(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        Ok(self.kv_delete(key)?)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.kv_keys_with_prefix(prefix)?)
    }
}

impl ShieldStore for Database {
    fn shield(&self) -> Result<ShieldSettings, StoreError> {
        Ok(self.kv_get_json(SHIELD_KEY)?.unwrap_or_default())
    }

    fn set_shield(&self, settings: &ShieldSettings) -> Result<(), StoreError> {
        self.kv_set_json(SHIELD_KEY, settings)
    }
}

impl SelectionSource for Database {
    fn load_selection(&self) -> Result<ActivitySelection, StoreError> {
        Ok(self.kv_get_json(SELECTION_KEY)?.unwrap_or_default())
    }

    fn save_selection(&self, selection: &ActivitySelection) -> Result<(), StoreError> {
        self.kv_set_json(SELECTION_KEY, selection)
    }
}
