//! SQLite-backed activity monitor.
//!
//! Stands in for the platform monitor on hosts that don't have one: names
//! and their weekly intervals live in the `activities` table, and
//! [`crate::blocking::MonitorEvents::sync`] turns them into shield changes.

use chrono::Utc;
use rusqlite::params;
use tracing::{debug, warn};

use crate::blocking::{ActivityMonitor, IntervalSchedule};
use crate::error::{DatabaseError, MonitorError};

use super::Database;

pub struct ActivityRegistry<'a> {
    db: &'a Database,
    max_activities: usize,
}

impl<'a> ActivityRegistry<'a> {
    pub fn new(db: &'a Database, max_activities: usize) -> Self {
        Self { db, max_activities }
    }

    /// Registered activities with their intervals, in registration order.
    ///
    /// # Errors
    /// Returns an error if the table cannot be read or a stored interval
    /// cannot be decoded.
    pub fn registered(&self) -> Result<Vec<(String, IntervalSchedule)>, DatabaseError> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT name, schedule FROM activities ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, raw)| {
                serde_json::from_str(&raw)
                    .map(|schedule| (name, schedule))
                    .map_err(|e| DatabaseError::QueryFailed(format!("corrupt activity schedule: {e}")))
            })
            .collect()
    }

    fn count(&self) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    fn exists(&self, name: &str) -> Result<bool, DatabaseError> {
        let count: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM activities WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn check_schedule(name: &str, schedule: &IntervalSchedule) -> Result<(), MonitorError> {
    let invalid = |reason: &str| MonitorError::InvalidSchedule {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if schedule.start == schedule.end {
        return Err(invalid("interval is empty"));
    }
    if schedule.start.weekday == schedule.end.weekday && schedule.end.offset_secs() < schedule.start.offset_secs() {
        return Err(invalid("interval ends before it starts"));
    }
    Ok(())
}

fn backend(err: impl std::fmt::Display) -> MonitorError {
    MonitorError::Backend(err.to_string())
}

impl ActivityMonitor for ActivityRegistry<'_> {
    fn start_monitoring(&self, name: &str, schedule: &IntervalSchedule) -> Result<(), MonitorError> {
        check_schedule(name, schedule)?;
        if self.exists(name).map_err(backend)? {
            return Err(MonitorError::DuplicateName(name.to_string()));
        }
        if self.count().map_err(backend)? >= self.max_activities {
            return Err(MonitorError::LimitExceeded {
                limit: self.max_activities,
            });
        }

        let payload = serde_json::to_string(schedule).map_err(backend)?;
        self.db
            .conn()
            .execute(
                "INSERT INTO activities (name, schedule, registered_at) VALUES (?1, ?2, ?3)",
                params![name, payload, Utc::now().to_rfc3339()],
            )
            .map_err(backend)?;
        debug!(activity = name, "activity registered");
        Ok(())
    }

    fn stop_monitoring(&self, names: &[String]) {
        for name in names {
            if let Err(e) = self
                .db
                .conn()
                .execute("DELETE FROM activities WHERE name = ?1", params![name])
            {
                warn!(activity = %name, error = %e, "failed to stop monitoring");
            }
        }
    }

    fn activities(&self) -> Vec<String> {
        let names = self
            .db
            .conn()
            .prepare("SELECT name FROM activities ORDER BY id")
            .and_then(|mut stmt| {
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>();
                names
            });
        names.unwrap_or_else(|e| {
            warn!(error = %e, "failed to list monitored activities");
            Vec::new()
        })
    }
}
