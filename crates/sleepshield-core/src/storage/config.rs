//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Activity and bookkeeping name prefixes for blocking
//! - Defaults used when creating a routine
//! - The calendar time zone
//!
//! Configuration is stored at `~/.config/sleepshield/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::blocking::BlockingConfig;
use crate::error::{ConfigError, ValidationError};
use crate::routine::{parse_clock_time, SleepRoutine};
use crate::weekday::WeekdaySet;

/// Values used for a new routine when the caller leaves them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineDefaults {
    #[serde(default = "default_sleep")]
    pub sleep: String,
    #[serde(default = "default_wake")]
    pub wake: String,
    #[serde(default = "default_pre_block_minutes")]
    pub pre_block_minutes: u32,
    #[serde(default = "default_post_block_minutes")]
    pub post_block_minutes: u32,
    #[serde(default = "default_weekdays")]
    pub weekdays: String,
}

/// Calendar configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// IANA zone name; the system zone when unset or empty.
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/sleepshield/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub routine_defaults: RoutineDefaults,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

fn default_sleep() -> String {
    "23:00".into()
}
fn default_wake() -> String {
    "07:00".into()
}
fn default_pre_block_minutes() -> u32 {
    60
}
fn default_post_block_minutes() -> u32 {
    30
}
fn default_weekdays() -> String {
    "everyday".into()
}

impl Default for RoutineDefaults {
    fn default() -> Self {
        Self {
            sleep: default_sleep(),
            wake: default_wake(),
            pre_block_minutes: default_pre_block_minutes(),
            post_block_minutes: default_post_block_minutes(),
            weekdays: default_weekdays(),
        }
    }
}

impl RoutineDefaults {
    /// Build an unsaved routine from these defaults.
    ///
    /// # Errors
    /// Returns an error if a clock time or the weekday list does not parse.
    pub fn to_routine(&self) -> Result<SleepRoutine, ValidationError> {
        SleepRoutine::new(
            parse_clock_time(&self.sleep)?,
            parse_clock_time(&self.wake)?,
            i64::from(self.pre_block_minutes) * 60,
            i64::from(self.post_block_minutes) * 60,
            self.weekdays.parse::<WeekdaySet>()?,
        )
    }
}

impl Config {
    fn get_json_value_by_path<'a>(root: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => {
                        serde_json::Value::Bool(value.parse::<bool>().map_err(|e| invalid(e.to_string()))?)
                    }
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) => return Err(unknown()),
                    serde_json::Value::Null if value.is_empty() => serde_json::Value::Null,
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from the data directory, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    ///
    /// # Errors
    /// Same as [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    /// Same as [`Config::save`].
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => Some(String::new()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. The value is coerced to the existing type.
    ///
    /// The config is left unchanged when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its current value, in dot-path form.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (key, child) in map {
                        let path = if prefix.is_empty() {
                            key.clone()
                        } else {
                            format!("{prefix}.{key}")
                        };
                        walk(&path, child, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                serde_json::Value::Null => out.push((prefix.to_string(), String::new())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Configured IANA zone name, if any.
    pub fn timezone(&self) -> Option<&str> {
        self.calendar.timezone.as_deref().filter(|tz| !tz.is_empty())
    }

    /// Check values that serde alone cannot.
    ///
    /// # Errors
    /// Returns the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        if self.blocking.activity_prefix.is_empty() {
            return Err(invalid("blocking.activity_prefix", "must not be empty".into()));
        }
        if self.blocking.storage_prefix.is_empty() {
            return Err(invalid("blocking.storage_prefix", "must not be empty".into()));
        }
        self.routine_defaults
            .to_routine()
            .map_err(|e| invalid("routine_defaults", e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.blocking.activity_prefix, "sleepshield.blocking");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("routine_defaults.sleep").as_deref(), Some("23:00"));
        assert_eq!(cfg.get("blocking.max_monitored_activities").as_deref(), Some("20"));
        assert_eq!(cfg.get("calendar.timezone").as_deref(), Some(""));
        assert!(cfg.get("blocking.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.set("routine_defaults.pre_block_minutes", "45").unwrap();
        assert_eq!(cfg.routine_defaults.pre_block_minutes, 45);
    }

    #[test]
    fn set_updates_nested_string() {
        let mut cfg = Config::default();
        cfg.set("routine_defaults.weekdays", "weekdays").unwrap();
        assert_eq!(cfg.get("routine_defaults.weekdays").as_deref(), Some("weekdays"));
    }

    #[test]
    fn set_and_clear_optional_timezone() {
        let mut cfg = Config::default();
        cfg.set("calendar.timezone", "America/New_York").unwrap();
        assert_eq!(cfg.timezone(), Some("America/New_York"));
        cfg.set("calendar.timezone", "").unwrap();
        assert_eq!(cfg.timezone(), None);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("blocking.nonexistent_key", "value"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("blocking", "value"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(cfg.set("", "value"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_rejects_invalid_values_and_keeps_config() {
        let mut cfg = Config::default();
        assert!(cfg.set("blocking.max_monitored_activities", "lots").is_err());
        assert!(cfg.set("routine_defaults.wake", "25:00").is_err());
        assert!(cfg.set("routine_defaults.weekdays", "someday").is_err());
        assert!(cfg.set("blocking.activity_prefix", "").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn defaults_build_a_routine() {
        let routine = Config::default().routine_defaults.to_routine().unwrap();
        assert_eq!(routine.sleep_offset_secs, 23 * 3600);
        assert_eq!(routine.pre_block_secs, 3600);
        assert_eq!(routine.weekdays, WeekdaySet::EVERYDAY);
    }

    #[test]
    fn entries_list_every_leaf() {
        let entries = Config::default().entries();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"blocking.storage_prefix"));
        assert!(keys.contains(&"routine_defaults.post_block_minutes"));
        assert!(keys.contains(&"calendar.timezone"));
    }

    #[test]
    fn load_from_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let first = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let mut changed = first.clone();
        changed.set("blocking.max_monitored_activities", "8").unwrap();
        changed.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.blocking.max_monitored_activities, 8);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[routine_defaults]\nsleep = \"22:15\"\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.routine_defaults.sleep, "22:15");
        assert_eq!(cfg.routine_defaults.wake, "07:00");
        assert_eq!(cfg.blocking, BlockingConfig::default());
    }
}
