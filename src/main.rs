//! # Strata — strategic planning backend
//!
//! Tracks projects and their actions, and runs the due-date notification scheduler.
//!
//! Usage:
//!   strata serve                               # Run the scheduler (interval from config)
//!   strata serve --interval 15                 # Custom interval in minutes
//!   strata tick                                # One evaluation pass, then exit
//!   strata project add --name Growth --party alice --party bob
//!   strata item add --project <id> --title "Hire lead" --due 2026-11-02
//!   strata notify list --recipient alice --unread

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use strata_core::planning::{compute_critical_path, rollup};
use strata_core::traits::NotificationSink;
use strata_core::{LifecycleState, Project, StrataConfig, TrackedItem};
use strata_scheduler::{DueDateScheduler, PassOutcome, SchedulerDb, sink_from_config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "strata",
    version,
    about = "📈 Strata — projects, actions and due-date notifications"
)]
struct Cli {
    /// Config file (default: ~/.strata/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the due-date scheduler until Ctrl-C
    Serve {
        /// Minutes between passes (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Run a single evaluation pass and print the report
    Tick {
        /// Evaluate as of this date (YYYY-MM-DD or RFC 3339), default now
        #[arg(long)]
        at: Option<String>,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Manage tracked actions
    Item {
        #[command(subcommand)]
        action: ItemAction,
    },
    /// Read stored notifications
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
    /// Write a default config file
    InitConfig,
}

#[derive(Subcommand)]
enum ProjectAction {
    Add {
        #[arg(long)]
        name: String,
        /// Responsible party (repeatable)
        #[arg(long = "party")]
        parties: Vec<String>,
    },
    List,
    /// Progress roll-up for a project
    Progress { id: String },
    /// Critical-path schedule for a project's non-archived items
    Schedule { id: String },
}

#[derive(Subcommand)]
enum ItemAction {
    Add {
        #[arg(long)]
        project: String,
        #[arg(long)]
        title: String,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
        /// Planned duration in days
        #[arg(long, default_value = "1")]
        duration: u32,
        /// Item that must finish first (repeatable)
        #[arg(long = "after")]
        depends_on: Vec<String>,
    },
    List {
        #[arg(long)]
        project: Option<String>,
    },
    SetState { id: String, state: String },
    /// Set or clear (`none`) the due date
    SetDue { id: String, due: String },
    SetProgress { id: String, progress: u8 },
}

#[derive(Subcommand)]
enum NotifyAction {
    List {
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long)]
        unread: bool,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    Read { id: i64 },
}

fn parse_when(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD or RFC 3339"))?;
    Ok(day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_scheduler(config: &StrataConfig, db: Arc<SchedulerDb>) -> Result<Arc<DueDateScheduler>> {
    let primary: Arc<dyn NotificationSink> = db.clone();
    let sink = sink_from_config(config, primary);
    let mut scheduler = DueDateScheduler::new(db.clone(), sink)
        .with_max_concurrent(config.scheduler.max_concurrent_dispatch);
    if config.scheduler.persist_ledger {
        scheduler = scheduler.with_ledger_store(db)?;
    }
    Ok(Arc::new(scheduler))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "strata=debug,strata_scheduler=debug,strata_core=debug"
    } else {
        "strata=info,strata_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(StrataConfig::default_path);
    let mut config = if config_path.exists() {
        StrataConfig::load_from(&config_path)?
    } else {
        StrataConfig::default()
    };
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }

    if let Command::InitConfig = cli.command {
        if config_path.exists() {
            println!("⚠️  Config already exists: {}", config_path.display());
        } else {
            StrataConfig::default().save_to(&config_path)?;
            println!("✅ Wrote default config to {}", config_path.display());
        }
        return Ok(());
    }

    let db_path = config.database.resolved_path();
    let db = Arc::new(
        SchedulerDb::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?,
    );

    match cli.command {
        Command::Serve { interval } => {
            if !config.scheduler.enabled {
                tracing::warn!("⚠️ Scheduler disabled in config, nothing to do");
                return Ok(());
            }
            let minutes = interval.unwrap_or(config.scheduler.interval_minutes);
            println!("📈 Strata v{}", env!("CARGO_PKG_VERSION"));
            println!("   🗄️  Database: {}", db_path.display());
            println!("   ⏰ Interval: {minutes} min");
            println!();

            let scheduler = build_scheduler(&config, db)?;
            let handle = scheduler.start(minutes);
            tokio::signal::ctrl_c().await?;
            tracing::info!("🛑 Shutting down, waiting for in-flight pass...");
            handle.stop().await;
        }
        Command::Tick { at } => {
            let now = at.as_deref().map(parse_when).transpose()?.unwrap_or_else(Utc::now);
            let scheduler = build_scheduler(&config, db)?;
            match scheduler.run_pass(now).await? {
                PassOutcome::Completed(report) => print_json(&report)?,
                PassOutcome::Skipped => println!("⏭️  Another pass is running"),
            }
        }
        Command::Project { action } => match action {
            ProjectAction::Add { name, parties } => {
                let project = Project::new(&name, parties);
                db.insert_project(&project)?;
                println!("✅ Project created: {} ({})", project.name, project.id);
            }
            ProjectAction::List => print_json(&db.list_projects()?)?,
            ProjectAction::Progress { id } => {
                db.get_project(&id)?.with_context(|| format!("project '{id}' not found"))?;
                let items = db.list_items(Some(&id))?;
                print_json(&rollup(&items, Utc::now()))?;
            }
            ProjectAction::Schedule { id } => {
                db.get_project(&id)?.with_context(|| format!("project '{id}' not found"))?;
                let items: Vec<TrackedItem> = db
                    .list_items(Some(&id))?
                    .into_iter()
                    .filter(|i| i.state != LifecycleState::Archived)
                    .collect();
                print_json(&compute_critical_path(&items)?)?;
            }
        },
        Command::Item { action } => match action {
            ItemAction::Add { project, title, due, duration, depends_on } => {
                db.get_project(&project)?
                    .with_context(|| format!("project '{project}' not found"))?;
                let due_date = due.as_deref().map(parse_when).transpose()?;
                let mut item = TrackedItem::new(&project, &title, due_date);
                item.duration_days = duration;
                item.depends_on = depends_on;
                db.insert_item(&item)?;
                println!("✅ Item created: {} ({})", item.title, item.id);
            }
            ItemAction::List { project } => print_json(&db.list_items(project.as_deref())?)?,
            ItemAction::SetState { id, state } => {
                let state: LifecycleState = state.parse()?;
                db.set_item_state(&id, state)?;
                println!("✅ {id} → {state}");
            }
            ItemAction::SetDue { id, due } => {
                let due_date = match due.as_str() {
                    "none" => None,
                    other => Some(parse_when(other)?),
                };
                db.set_item_due(&id, due_date)?;
                println!("✅ {id} due date updated");
            }
            ItemAction::SetProgress { id, progress } => {
                db.set_item_progress(&id, progress)?;
                println!("✅ {id} → {progress}%");
            }
        },
        Command::Notify { action } => match action {
            NotifyAction::List { recipient, unread, limit } => {
                print_json(&db.list_notifications(recipient.as_deref(), unread, limit)?)?
            }
            NotifyAction::Read { id } => {
                db.mark_notification_read(id)?;
                println!("✅ Notification {id} marked read");
            }
        },
        Command::InitConfig => unreachable!("handled before opening the database"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_when_accepts_date_and_rfc3339() {
        let day = parse_when("2026-11-02").unwrap();
        assert_eq!(day.to_rfc3339(), "2026-11-02T00:00:00+00:00");
        let ts = parse_when("2026-11-02T15:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-11-02T13:30:00+00:00");
        assert!(parse_when("next tuesday").is_err());
    }

    #[test]
    fn test_cli_parses_item_add() {
        let cli = Cli::try_parse_from([
            "strata", "item", "add", "--project", "prj-1", "--title", "Ship", "--due", "2026-11-02",
            "--after", "act-1", "--after", "act-2",
        ])
        .unwrap();
        match cli.command {
            Command::Item { action: ItemAction::Add { depends_on, duration, .. } } => {
                assert_eq!(depends_on, vec!["act-1".to_string(), "act-2".to_string()]);
                assert_eq!(duration, 1);
            }
            _ => panic!("wrong command"),
        }
    }
}
