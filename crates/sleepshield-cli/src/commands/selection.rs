use std::collections::BTreeSet;

use chrono::TimeZone;
use clap::Subcommand;
use sleepshield_core::{ActivitySelection, SelectionSource};
use tracing::info;

use crate::context::{with_zone, Context};

#[derive(Subcommand)]
pub enum SelectionAction {
    /// Show what is blocked during intervals
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Replace the blocked selection and refresh scheduled routines
    Set {
        /// Application tokens, comma-separated
        #[arg(long, value_delimiter = ',')]
        apps: Vec<String>,
        /// Category tokens, comma-separated
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
        /// Web domains, comma-separated
        #[arg(long, value_delimiter = ',')]
        domains: Vec<String>,
    },
    /// Block nothing
    Clear,
}

fn tokens(values: Vec<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

pub fn run(action: SelectionAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open()?;
    match action {
        SelectionAction::Show { json } => {
            let selection = ctx.db.load_selection()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&selection)?);
            } else if selection.is_empty() {
                println!("Nothing selected.");
            } else {
                for (kind, set) in [
                    ("apps", &selection.applications),
                    ("categories", &selection.categories),
                    ("domains", &selection.web_domains),
                ] {
                    let list: Vec<&str> = set.iter().map(String::as_str).collect();
                    println!("{kind}: {}", list.join(", "));
                }
            }
        }
        SelectionAction::Set {
            apps,
            categories,
            domains,
        } => {
            let selection = ActivitySelection {
                applications: tokens(apps),
                categories: tokens(categories),
                web_domains: tokens(domains),
            };
            ctx.db.save_selection(&selection)?;
            let refreshed = with_zone!(ctx, |tz| refresh(&ctx, tz))?;
            println!("Selection saved ({} items, {refreshed} routines refreshed)", selection.len());
        }
        SelectionAction::Clear => {
            ctx.db.save_selection(&ActivitySelection::default())?;
            let refreshed = with_zone!(ctx, |tz| refresh(&ctx, tz))?;
            println!("Selection cleared ({refreshed} routines refreshed)");
        }
    }
    Ok(())
}

/// Re-register every scheduled routine so the new selection takes effect.
fn refresh<Z: TimeZone>(ctx: &Context, tz: Z) -> Result<usize, Box<dyn std::error::Error>> {
    let scheduler = ctx.scheduler(tz);
    let mut refreshed = 0;
    for routine in ctx.db.list_routines()? {
        if scheduler.persisted_names(&routine)?.is_empty() {
            continue;
        }
        scheduler
            .update_blocking_selection(&routine)
            .map_err(|e| format!("couldn't schedule blocking: {e}"))?;
        refreshed += 1;
    }
    info!(refreshed, "routines refreshed after selection change");
    Ok(refreshed)
}
