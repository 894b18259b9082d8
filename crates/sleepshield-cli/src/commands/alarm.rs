use chrono::{TimeZone, Utc};
use clap::Subcommand;
use serde::Serialize;
use sleepshield_core::{parse_clock_time, Alarm, AlarmBook, WeekdaySet};

use crate::context::{with_zone, Context};

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Create an alarm
    Add {
        /// Time of day (HH:MM)
        time: String,
        /// Repeat days; omit for a one-time alarm
        #[arg(long)]
        days: Option<String>,
        #[arg(long, default_value = "Alarm")]
        label: String,
    },
    /// List alarms
    List {
        /// Only alarms repeating on these days
        #[arg(long)]
        days: Option<String>,
        /// With --days, only alarms repeating on exactly these days
        #[arg(long, requires = "days")]
        exact: bool,
        #[arg(long)]
        json: bool,
    },
    /// Delete an alarm
    Cancel { id: String },
}

#[derive(Serialize)]
struct AlarmView<'a> {
    #[serde(flatten)]
    alarm: &'a Alarm,
    next_fire: Option<String>,
}

pub fn run(action: AlarmAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;
    with_zone!(ctx, |tz| execute(&ctx, tz, action))
}

fn execute<Z: TimeZone>(ctx: &Context, tz: Z, action: AlarmAction) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now().with_timezone(&tz);

    match action {
        AlarmAction::Add { time, days, label } => {
            let offset = parse_clock_time(&time)?;
            let weekdays = match days {
                Some(days) => days.parse::<WeekdaySet>()?,
                None => WeekdaySet::EMPTY,
            };
            let alarm = Alarm::new((offset / 3600) as u8, (offset % 3600 / 60) as u8, weekdays, label)?;
            ctx.db.insert_alarm(&alarm)?;
            println!("Alarm created: {}", alarm.id);
        }
        AlarmAction::List { days, exact, json } => {
            let book = AlarmBook::new(ctx.db.list_alarms()?);
            let selected: Vec<&Alarm> = match days {
                Some(days) => {
                    let days = days.parse::<WeekdaySet>()?;
                    if exact {
                        book.matching(days)
                    } else {
                        book.containing(days)
                    }
                }
                None => book.alarms().iter().collect(),
            };
            let views: Vec<AlarmView> = selected
                .into_iter()
                .map(|alarm| AlarmView {
                    alarm,
                    next_fire: alarm
                        .next_fire(&now)
                        .map(|at| at.naive_local().format("%a %Y-%m-%d %H:%M").to_string()),
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                println!("No alarms.");
            } else {
                for view in &views {
                    let repeat = if view.alarm.is_repeating() {
                        view.alarm.weekdays.to_string()
                    } else {
                        "once".to_string()
                    };
                    println!(
                        "{}  {:02}:{:02}  {}  {}{}",
                        view.alarm.id,
                        view.alarm.hour,
                        view.alarm.minute,
                        repeat,
                        view.alarm.label,
                        if view.alarm.enabled { "" } else { "  [disabled]" }
                    );
                }
                if let Some((alarm, at)) = book.next_fire(&now) {
                    println!(
                        "Next: {} at {}",
                        alarm.label,
                        at.naive_local().format("%a %Y-%m-%d %H:%M")
                    );
                }
            }
        }
        AlarmAction::Cancel { id } => {
            if !ctx.db.delete_alarm(&id)? {
                return Err(format!("alarm not found: {id}").into());
            }
            println!("Alarm cancelled: {id}");
        }
    }
    Ok(())
}
