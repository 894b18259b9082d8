mod activity_registry;
mod config;
pub mod database;
pub mod migrations;

pub use activity_registry::ActivityRegistry;
pub use config::{CalendarConfig, Config, RoutineDefaults};
pub use database::{Database, SELECTION_KEY, SHIELD_KEY};

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `SLEEPSHIELD_DATA_DIR` wins when set. Otherwise `~/.config/sleepshield[-dev]/`
/// based on SLEEPSHIELD_ENV; set SLEEPSHIELD_ENV=dev to use the development
/// data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("SLEEPSHIELD_DATA_DIR").filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("SLEEPSHIELD_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("sleepshield-dev")
            } else {
                base_dir.join("sleepshield")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
