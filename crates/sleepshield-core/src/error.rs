//! Core error types for sleepshield-core.
//!
//! This module defines the error hierarchy using thiserror. Scheduling
//! failures are split by origin: the monitor that rejects an interval, the
//! store that keeps request bookkeeping, and the scheduler that ties them
//! together.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for sleepshield-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Blocking schedule errors
    #[error("Blocking error: {0}")]
    Blocking(#[from] BlockingError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Row not found
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Time-of-day offset outside a single day
    #[error("Offset for '{field}' must be within [0, 86400) seconds, got {value}")]
    OffsetOutOfRange { field: &'static str, value: i64 },

    /// Negative duration
    #[error("Duration for '{field}' must not be negative, got {value}")]
    NegativeDuration { field: &'static str, value: i64 },

    /// Unparseable clock time
    #[error("Invalid clock time '{0}', expected HH:MM")]
    InvalidClockTime(String),

    /// Unparseable weekday list
    #[error("Invalid weekday '{0}'")]
    InvalidWeekday(String),
}

/// Errors raised by an activity monitor when registering an interval.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Platform policy caps the number of monitored activities
    #[error("Monitored activity limit of {limit} reached")]
    LimitExceeded { limit: usize },

    /// An activity with the same name is already being monitored
    #[error("Activity '{0}' is already monitored")]
    DuplicateName(String),

    /// The interval cannot be monitored
    #[error("Invalid schedule for '{name}': {reason}")]
    InvalidSchedule { name: String, reason: String },

    /// Backend failure
    #[error("Monitor backend failure: {0}")]
    Backend(String),
}

/// Errors raised by the key-value, shield and selection stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Store database error: {0}")]
    Database(#[from] DatabaseError),

    /// Stored payload could not be encoded or decoded
    #[error("Store payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Backend failure
    #[error("Store backend failure: {0}")]
    Backend(String),
}

/// Errors raised by the blocking-window scheduler.
#[derive(Error, Debug)]
pub enum BlockingError {
    /// The routine has not been persisted and carries no stable identity
    #[error("Routine has no stable identity; it must be persisted before scheduling")]
    MissingIdentity,

    /// The monitor rejected a request; every request started in the same batch was stopped
    #[error("Failed to register '{name}': {source}")]
    Registration {
        name: String,
        #[source]
        source: MonitorError,
    },

    /// Request bookkeeping could not be read or written
    #[error("Request bookkeeping failed: {0}")]
    Store(#[from] StoreError),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(DatabaseError::from(err))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Blocking(BlockingError::Store(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
