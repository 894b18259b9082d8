//! State shared by every command: configuration, database and calendar zone.

use chrono::TimeZone;
use chrono_tz::Tz;
use sleepshield_core::{ActivityRegistry, BlockingScheduler, Config, Database, SleepRoutine};
use tracing::debug;

pub type Scheduler<'a, Z> = BlockingScheduler<ActivityRegistry<'a>, &'a Database, &'a Database, Z>;

/// Calendar used for blocking windows.
pub enum Zone {
    /// The system's local zone.
    System,
    Named(Tz),
}

pub struct Context {
    pub db: Database,
    pub config: Config,
}

impl Context {
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let db = Database::open()?;
        debug!(timezone = ?config.timezone(), "context opened");
        Ok(Self { db, config })
    }

    pub fn zone(&self) -> Result<Zone, Box<dyn std::error::Error>> {
        match self.config.timezone() {
            Some(name) => name
                .parse::<Tz>()
                .map(Zone::Named)
                .map_err(|e| format!("invalid calendar.timezone '{name}': {e}").into()),
            None => Ok(Zone::System),
        }
    }

    pub fn registry(&self) -> ActivityRegistry<'_> {
        ActivityRegistry::new(&self.db, self.config.blocking.max_monitored_activities)
    }

    pub fn scheduler<Z: TimeZone>(&self, tz: Z) -> Scheduler<'_, Z> {
        BlockingScheduler::new(self.registry(), &self.db, &self.db, tz, self.config.blocking.clone())
    }

    /// Look up a routine by id.
    pub fn routine(&self, id: &str) -> Result<SleepRoutine, Box<dyn std::error::Error>> {
        self.db
            .get_routine(id)?
            .ok_or_else(|| format!("routine not found: {id}").into())
    }
}

/// Run `$body` with `$tz` bound to the configured calendar zone.
macro_rules! with_zone {
    ($ctx:expr, |$tz:ident| $body:expr) => {
        match $ctx.zone()? {
            $crate::context::Zone::System => {
                let $tz = chrono::Local;
                $body
            }
            $crate::context::Zone::Named($tz) => $body,
        }
    };
}

pub(crate) use with_zone;
