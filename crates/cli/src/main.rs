//! rdburn CLI - effort-hours burndown snapshots for tracker milestones.

mod config;
mod export;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{warn, Level};

use config::Config;
use rdburn_core::{ProjectId, TargetRange};
use rdburn_engine::{forecast, replay_range, ReplayRequest, VelocitySummary};
use rdburn_storage::{SqliteStore, Store};
use rdburn_sync::{RedmineClient, SyncService, TrackerClient};

#[derive(Parser)]
#[command(name = "rdburn")]
#[command(about = "Effort-hours burndown for tracker milestones", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify tracker connectivity and credentials
    Check,
    /// Mirror issues and journals into the local database
    Sync {
        /// Project identifier (defaults to redmine.project)
        #[arg(long)]
        project: Option<String>,
        /// Version name (defaults to redmine.version)
        #[arg(long)]
        version: Option<String>,
        /// Ignore the incremental watermark and refetch everything
        #[arg(long)]
        full: bool,
    },
    /// Compute the snapshot for one date
    Snapshot {
        /// Project identifier
        #[arg(long)]
        project: Option<String>,
        /// Track a milestone by version name
        #[arg(long)]
        version: Option<String>,
        /// Track a due-date cut instead of a milestone
        #[arg(long)]
        due_date: Option<NaiveDate>,
        /// Date to close; defaults to today in the configured offset
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Recompute an already-snapshotted date
        #[arg(long)]
        force: bool,
    },
    /// Replay history over a contiguous date range
    Replay {
        /// Project identifier
        #[arg(long)]
        project: Option<String>,
        /// Track a milestone by version name
        #[arg(long)]
        version: Option<String>,
        /// Track a due-date cut instead of a milestone
        #[arg(long)]
        due_date: Option<NaiveDate>,
        /// First day to replay (defaults to the range start)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day to replay (defaults to today)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Recompute days that already have snapshots
        #[arg(long)]
        force: bool,
    },
    /// Export the snapshot series as CSV
    Export {
        /// Project identifier
        #[arg(long)]
        project: Option<String>,
        /// Track a milestone by version name
        #[arg(long)]
        version: Option<String>,
        /// Track a due-date cut instead of a milestone
        #[arg(long)]
        due_date: Option<NaiveDate>,
        /// Export per-assignee rows instead of the aggregate series
        #[arg(long)]
        assignees: bool,
        /// Append the three pacing scenarios projected to the due date
        #[arg(long)]
        forecast: bool,
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Check => run_check(&config).await,
        Commands::Sync { project, version, full } => {
            run_sync(&config, project, version, full).await
        }
        Commands::Snapshot { project, version, due_date, date, force } => {
            let date = match date {
                Some(date) => date,
                None => today(&config)?,
            };
            let from = force.then_some(date);
            run_replay(&config, project, version, due_date, from, date, force).await
        }
        Commands::Replay { project, version, due_date, from, to, force } => {
            let to = match to {
                Some(to) => to,
                None => today(&config)?,
            };
            run_replay(&config, project, version, due_date, from, to, force).await
        }
        Commands::Export { project, version, due_date, assignees, forecast, output } => {
            run_export(&config, project, version, due_date, assignees, forecast, output).await
        }
    }
}

fn today(config: &Config) -> Result<NaiveDate> {
    Ok(Utc::now().with_timezone(&config.utc_offset()?).date_naive())
}

fn client(config: &Config) -> Result<RedmineClient> {
    Ok(RedmineClient::new(
        &config.redmine.base_url,
        config.redmine.api_key.clone(),
        config.redmine.timeout_sec,
    )?)
}

async fn run_check(config: &Config) -> Result<()> {
    let client = client(config)?;
    let statuses = client.get_statuses().await?;
    println!("Connected to {} ({} statuses)", config.redmine.base_url, statuses.len());

    if let Some(identifier) = &config.redmine.project {
        let project = client.get_project(identifier).await?;
        println!("Project: {} (id {})", project.name, project.id);
    }
    Ok(())
}

async fn run_sync(
    config: &Config,
    project: Option<String>,
    version: Option<String>,
    full: bool,
) -> Result<()> {
    let identifier = project
        .or_else(|| config.redmine.project.clone())
        .context("no project configured; pass --project or set redmine.project")?;
    let version = version.or_else(|| config.redmine.version.clone());

    let mut store = SqliteStore::open(&config.database.path).await?;
    let service = SyncService::new(client(config)?);
    let report = service
        .sync_project(&mut store, &identifier, version.as_deref(), full)
        .await?;

    for warning in &report.warnings {
        warn!("{warning}");
    }
    println!(
        "Synced {} issue(s), {} new journal record(s) for project {}",
        report.issues_synced, report.journals_appended, report.project_id
    );
    Ok(())
}

/// Resolve the CLI target selection against the synced mirror.
async fn resolve_target(
    store: &SqliteStore,
    config: &Config,
    project: Option<String>,
    version: Option<String>,
    due_date: Option<NaiveDate>,
) -> Result<(ProjectId, TargetRange)> {
    let identifier = project
        .or_else(|| config.redmine.project.clone())
        .context("no project configured; pass --project or set redmine.project")?;
    let project_id = store
        .project_id(&identifier)
        .await?
        .with_context(|| format!("project '{identifier}' not synced yet; run `rdburn sync`"))?;

    let target = if let Some(due_date) = due_date {
        TargetRange::DueDateCut { project_id, due_date, name: format!("Release-{due_date}") }
    } else {
        let name = version
            .or_else(|| config.redmine.version.clone())
            .context("pass --version or --due-date, or set redmine.version")?;
        let version = store
            .load_version(project_id, &name)
            .await?
            .with_context(|| format!("version '{name}' not synced yet; run `rdburn sync`"))?;
        TargetRange::Milestone(version)
    };
    Ok((project_id, target))
}

async fn run_replay(
    config: &Config,
    project: Option<String>,
    version: Option<String>,
    due_date: Option<NaiveDate>,
    from: Option<NaiveDate>,
    to: NaiveDate,
    force: bool,
) -> Result<()> {
    let mut store = SqliteStore::open(&config.database.path).await?;
    let (project_id, target) = resolve_target(&store, config, project, version, due_date).await?;

    let calendar = config.calendar()?;
    let done = config.done_set();
    let baselines = store.load_baselines(project_id).await?;
    let journal = store.load_journal(project_id).await?;
    let synced_through = store.sync_horizon(project_id).await?;

    let summary = replay_range(
        &mut store,
        ReplayRequest {
            target: &target,
            baselines,
            journal,
            done: &done,
            calendar: &calendar,
            outlier: config.outlier(),
            from,
            to,
            synced_through,
            force,
        },
    )
    .await?;

    for warning in &summary.warnings {
        warn!("{warning}");
    }
    println!(
        "{}: {} day(s) written, {} skipped",
        target.name(),
        summary.written,
        summary.skipped
    );
    Ok(())
}

async fn run_export(
    config: &Config,
    project: Option<String>,
    version: Option<String>,
    due_date: Option<NaiveDate>,
    assignees: bool,
    with_forecast: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let store = SqliteStore::open(&config.database.path).await?;
    let (_, target) = resolve_target(&store, config, project, version, due_date).await?;
    let key = target.key();

    let snapshots = store.load_snapshots(&key).await?;
    if snapshots.is_empty() {
        anyhow::bail!("no snapshots for {}; run `rdburn replay` first", target.name());
    }

    let mut out = if assignees {
        let mut rows = Vec::new();
        for snapshot in &snapshots {
            rows.extend(store.load_assignee_day(&key, snapshot.date).await?);
        }
        export::assignee_csv(&rows)
    } else {
        export::snapshot_csv(&snapshots)
    };

    if let (true, Some(latest)) = (with_forecast, snapshots.last()) {
        let due = target
            .due_date()
            .context("cannot forecast a range with no due date")?;
        let calendar = config.calendar()?;
        let horizon = calendar
            .count_working_days(latest.date + Duration::days(1), due + Duration::days(1));
        let summary =
            VelocitySummary { avg: latest.v_avg, max: latest.v_max, min: latest.v_min };
        out.push_str(&export::forecast_csv(&forecast(
            latest.remaining_hours,
            summary,
            horizon,
        )));
    }

    match output {
        Some(path) => {
            std::fs::write(&path, out).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{out}"),
    }
    Ok(())
}
