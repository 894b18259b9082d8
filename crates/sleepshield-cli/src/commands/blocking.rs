use chrono::{TimeZone, Utc};
use clap::Subcommand;
use serde::Serialize;
use sleepshield_core::blocking::{IntervalSchedule, TimeComponents, CURRENT_INTERVAL_KEY};
use sleepshield_core::weekday::short_name;
use sleepshield_core::{KeyValueStore, MonitorEvents, ShieldStore, SyncOutcome};

use crate::context::{with_zone, Context};

#[derive(Subcommand)]
pub enum BlockingAction {
    /// Register a routine's blocking window, replacing any earlier one
    Schedule { routine_id: String },
    /// Re-register after the blocked selection changed
    Update { routine_id: String },
    /// Stop a routine's blocking
    Stop { routine_id: String },
    /// Lift the shield until the next interval starts
    Pause,
    /// Stop every monitored activity
    StopAll,
    /// Show shield and registration state
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show the intervals a routine would register, without registering them
    Preview {
        routine_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Apply or clear the shield for the interval containing the current time
    Sync {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct ActivityView {
    name: String,
    start: String,
    end: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    degraded: bool,
}

#[derive(Serialize)]
struct StatusView {
    activated: bool,
    current_interval: Option<String>,
    activities: Vec<ActivityView>,
}

fn describe(at: &TimeComponents) -> String {
    format!("{} {:02}:{:02}:{:02}", short_name(at.weekday), at.hour, at.minute, at.second)
}

fn activity_view(name: String, schedule: &IntervalSchedule, degraded: bool) -> ActivityView {
    ActivityView {
        name,
        start: describe(&schedule.start),
        end: describe(&schedule.end),
        degraded,
    }
}

fn print_activities(views: &[ActivityView]) {
    for view in views {
        println!(
            "  {}  {} -> {}{}",
            view.name,
            view.start,
            view.end,
            if view.degraded { "  (approximate)" } else { "" }
        );
    }
}

pub fn run(action: BlockingAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;
    with_zone!(ctx, |tz| execute(&ctx, tz, action))
}

fn execute<Z: TimeZone>(ctx: &Context, tz: Z, action: BlockingAction) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now().with_timezone(&tz);
    let scheduler = ctx.scheduler(tz);

    match action {
        BlockingAction::Schedule { routine_id } => {
            let routine = ctx.routine(&routine_id)?;
            let names = scheduler
                .schedule_blocking(&routine)
                .map_err(|e| format!("couldn't schedule blocking: {e}"))?;
            println!("Scheduled {} activities", names.len());
            for name in &names {
                println!("  {name}");
            }
        }
        BlockingAction::Update { routine_id } => {
            let routine = ctx.routine(&routine_id)?;
            let names = scheduler
                .update_blocking_selection(&routine)
                .map_err(|e| format!("couldn't schedule blocking: {e}"))?;
            println!("Rescheduled {} activities", names.len());
        }
        BlockingAction::Stop { routine_id } => {
            let routine = ctx.routine(&routine_id)?;
            scheduler.stop_blocking(&routine)?;
            println!("Blocking stopped for {routine_id}");
        }
        BlockingAction::Pause => {
            scheduler.pause_blocking()?;
            println!("Blocking paused until the next interval starts");
        }
        BlockingAction::StopAll => {
            scheduler.stop_all_blocking()?;
            println!("All blocking stopped");
        }
        BlockingAction::Status { json } => {
            let activities = scheduler
                .monitor()
                .registered()?
                .into_iter()
                .map(|(name, schedule)| activity_view(name, &schedule, false))
                .collect();
            let status = StatusView {
                activated: scheduler.blocking_is_activated()?,
                current_interval: ctx
                    .db
                    .array(CURRENT_INTERVAL_KEY)?
                    .and_then(|names| names.into_iter().next()),
                activities,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Shield: {}", if status.activated { "enforcing" } else { "off" });
                if let Some(current) = &status.current_interval {
                    println!("Current interval: {current}");
                }
                println!("Registered activities: {}", status.activities.len());
                print_activities(&status.activities);
            }
        }
        BlockingAction::Preview { routine_id, json } => {
            let routine = ctx.routine(&routine_id)?;
            let prefix = &ctx.config.blocking.activity_prefix;
            let views: Vec<ActivityView> = scheduler
                .requests_for(&routine)?
                .iter()
                .map(|request| activity_view(request.key.activity_name(prefix), &request.schedule, request.degraded))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                println!("No intervals: the routine has no days selected");
            } else {
                print_activities(&views);
            }
        }
        BlockingAction::Sync { json } => {
            let registered = scheduler.monitor().registered()?;
            let events = MonitorEvents::new(&ctx.db, &ctx.db, &ctx.db);
            let outcome = events.sync(&registered, &now)?;
            if json {
                println!("{}", serde_json::to_string(&outcome)?);
            } else {
                match &outcome {
                    SyncOutcome::Started(name) => println!("Interval started: {name}"),
                    SyncOutcome::Ended(name) => println!("Interval ended: {name}"),
                    SyncOutcome::Unchanged => println!("No change"),
                }
                println!(
                    "Shield: {}",
                    if ctx.db.shield()?.is_enforcing() { "enforcing" } else { "off" }
                );
            }
        }
    }
    Ok(())
}
