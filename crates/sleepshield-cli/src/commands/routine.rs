use chrono::{TimeZone, Utc};
use clap::Subcommand;
use serde::Serialize;
use sleepshield_core::{
    format_clock_time, parse_clock_time, Alarm, RoutineEdit, SleepRoutine, ValidationError, WeekdaySet,
};
use tracing::warn;

use crate::context::{with_zone, Context};

#[derive(Subcommand)]
pub enum RoutineAction {
    /// Create a routine and schedule its blocking window
    Add {
        /// Sleep time (HH:MM); config default when omitted
        #[arg(long)]
        sleep: Option<String>,
        /// Wake time (HH:MM)
        #[arg(long)]
        wake: Option<String>,
        /// Minutes of blocking before sleep
        #[arg(long)]
        pre: Option<u32>,
        /// Minutes of blocking after waking
        #[arg(long)]
        post: Option<u32>,
        /// Days: everyday, weekdays, weekend, none, or a list like "mon,wed,fri"
        #[arg(long)]
        days: Option<String>,
        /// Also create a wake alarm
        #[arg(long)]
        with_alarm: bool,
    },
    /// List routines
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a routine and its registered activities
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Edit a routine and reschedule it
    Edit {
        id: String,
        #[arg(long)]
        sleep: Option<String>,
        #[arg(long)]
        wake: Option<String>,
        #[arg(long)]
        pre: Option<u32>,
        #[arg(long)]
        post: Option<u32>,
        #[arg(long)]
        days: Option<String>,
    },
    /// Stop a routine's blocking and delete it
    Delete { id: String },
}

#[derive(Serialize)]
struct RoutineView {
    id: String,
    sleep: String,
    wake: String,
    pre_block_minutes: i64,
    post_block_minutes: i64,
    days: String,
    block_start: String,
    block_end: String,
    active_now: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    activities: Option<Vec<String>>,
}

impl RoutineView {
    fn new<Z: TimeZone>(routine: &SleepRoutine, now: &chrono::DateTime<Z>) -> Self {
        Self {
            id: routine.id.clone().unwrap_or_default(),
            sleep: format_clock_time(routine.sleep_offset_secs),
            wake: format_clock_time(routine.wake_offset_secs),
            pre_block_minutes: routine.pre_block_secs / 60,
            post_block_minutes: routine.post_block_secs / 60,
            days: routine.weekdays.to_string(),
            block_start: format_clock_time(routine.block_start_offset(now).value()),
            block_end: format_clock_time(routine.block_end_offset(now).value()),
            active_now: routine.is_blocking_active(now),
            activities: None,
        }
    }
}

fn minutes(value: Option<u32>) -> Option<i64> {
    value.map(|m| i64::from(m) * 60)
}

fn clock(value: Option<&str>) -> Result<Option<i64>, ValidationError> {
    value.map(parse_clock_time).transpose()
}

fn days(value: Option<&str>) -> Result<Option<WeekdaySet>, ValidationError> {
    value.map(|v| v.parse::<WeekdaySet>()).transpose()
}

pub fn run(action: RoutineAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;
    with_zone!(ctx, |tz| execute(&ctx, tz, action))
}

fn execute<Z: TimeZone>(ctx: &Context, tz: Z, action: RoutineAction) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now().with_timezone(&tz);
    let scheduler = ctx.scheduler(tz);

    match action {
        RoutineAction::Add {
            sleep,
            wake,
            pre,
            post,
            days: day_list,
            with_alarm,
        } => {
            let mut routine = ctx.config.routine_defaults.to_routine()?;
            routine.apply(RoutineEdit {
                sleep_offset_secs: clock(sleep.as_deref())?,
                wake_offset_secs: clock(wake.as_deref())?,
                pre_block_secs: minutes(pre),
                post_block_secs: minutes(post),
                weekdays: days(day_list.as_deref())?,
            })?;

            let routine = ctx.db.insert_routine(&routine)?;
            let id = routine.id.clone().unwrap_or_default();
            if let Err(e) = scheduler.schedule_blocking(&routine) {
                warn!(routine = %id, error = %e, "removing routine whose first schedule failed");
                ctx.db.delete_routine(&id)?;
                return Err(format!("couldn't schedule blocking: {e}").into());
            }

            if with_alarm {
                let alarm = Alarm::for_routine(&routine);
                ctx.db.insert_alarm(&alarm)?;
                println!("Alarm created: {}", alarm.id);
            }
            println!("Routine created: {id}");
            let view = RoutineView::new(&routine, &now);
            println!("  Window: {} -> {} ({})", view.block_start, view.block_end, view.days);
        }
        RoutineAction::List { json } => {
            let routines = ctx.db.list_routines()?;
            let views: Vec<RoutineView> = routines.iter().map(|r| RoutineView::new(r, &now)).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                println!("No routines.");
            } else {
                for view in &views {
                    println!(
                        "{}  sleep {} wake {}  block {} -> {}  {}{}",
                        view.id,
                        view.sleep,
                        view.wake,
                        view.block_start,
                        view.block_end,
                        view.days,
                        if view.active_now { "  [active]" } else { "" }
                    );
                }
            }
        }
        RoutineAction::Show { id, json } => {
            let routine = ctx.routine(&id)?;
            let mut view = RoutineView::new(&routine, &now);
            view.activities = Some(scheduler.persisted_names(&routine)?);
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("Routine: {}", view.id);
                println!("  Sleep: {}  Wake: {}", view.sleep, view.wake);
                println!(
                    "  Buffers: {} min before, {} min after",
                    view.pre_block_minutes, view.post_block_minutes
                );
                println!("  Days: {}", view.days);
                println!("  Window: {} -> {}", view.block_start, view.block_end);
                println!("  Active now: {}", if view.active_now { "yes" } else { "no" });
                for name in view.activities.iter().flatten() {
                    println!("  - {name}");
                }
            }
        }
        RoutineAction::Edit {
            id,
            sleep,
            wake,
            pre,
            post,
            days: day_list,
        } => {
            let mut routine = ctx.routine(&id)?;
            routine.apply(RoutineEdit {
                sleep_offset_secs: clock(sleep.as_deref())?,
                wake_offset_secs: clock(wake.as_deref())?,
                pre_block_secs: minutes(pre),
                post_block_secs: minutes(post),
                weekdays: days(day_list.as_deref())?,
            })?;
            ctx.db.update_routine(&routine)?;
            let names = scheduler
                .schedule_blocking(&routine)
                .map_err(|e| format!("routine saved but couldn't schedule blocking: {e}"))?;
            println!("Routine updated: {id} ({} activities)", names.len());
        }
        RoutineAction::Delete { id } => {
            let routine = ctx.routine(&id)?;
            scheduler.stop_blocking(&routine)?;
            ctx.db.delete_routine(&id)?;
            println!("Routine deleted: {id}");
        }
    }
    Ok(())
}
