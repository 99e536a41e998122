use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod config;
mod db;
mod loader;
mod logging;
mod metrics;
mod models;
mod report;
mod view;

use config::Settings;
use loader::{Snapshot, Source};
use metrics::{Buckets, MAX_TREND_DAYS};
use models::{DateRange, DefectField, Priority, Severity, Status, Validation};
use view::{DashboardView, DefectQuery, TimeWindow};

#[derive(Parser)]
#[command(name = "defect-metrics")]
#[command(about = "Defect tracking metrics for engineering dashboards", long_about = None)]
struct Cli {
    /// Settings file; defaults to ./dashboard.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ScopeArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day to include; defaults to --from
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
    /// Relative window, ignored when --from is set
    #[arg(long, value_enum, default_value_t = TimeWindow::All)]
    window: TimeWindow,
    #[arg(long)]
    application: Option<String>,
    /// Read defects.json and teams.json from this directory instead of Postgres
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

impl ScopeArgs {
    fn view(&self) -> DashboardView {
        DashboardView {
            date_range: DateRange::new(self.from, self.to),
            window: self.window,
            application: self.application.clone(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed teams and defects
    Seed,
    /// Import defects from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Write the current defects and teams to a snapshot directory
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    /// Show headline KPIs
    Kpi {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Count defects per value of one field
    Distribution {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, value_enum)]
        field: DefectField,
    },
    /// Rank teams and show cross-team load
    Teams {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Daily created/resolved/critical counts
    Trends {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Days to show, including today
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=MAX_TREND_DAYS as i64))]
        days: Option<u32>,
    },
    /// Search and filter individual defects
    Defects {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        validation: Option<Validation>,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Generate a full metrics report
    Report {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long, default_value = "defect-report.md")]
        out: PathBuf,
    },
}

async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load(scope: &ScopeArgs, settings: &Settings) -> anyhow::Result<Snapshot> {
    let source = match scope.snapshot_dir.as_ref().or(settings.snapshot_dir.as_ref()) {
        Some(dir) => Source::Files(dir.clone()),
        None => Source::Postgres(connect(settings).await?),
    };

    let mut snapshot = Snapshot::default();
    snapshot.refresh(&source).await;
    Ok(snapshot)
}

fn write_output(out: &Path, contents: String) -> anyhow::Result<()> {
    std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))?;
    println!("Report written to {}.", out.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    logging::init(&settings);
    let now = Local::now().naive_local();

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&settings).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&settings).await?;
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} new defects).");
        }
        Commands::Import { csv } => {
            let pool = connect(&settings).await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} defects from {}.", csv.display());
        }
        Commands::Export { out } => {
            let pool = connect(&settings).await?;
            let snapshot = Snapshot::fetch(&Source::Postgres(pool)).await?;
            snapshot
                .write_to(&out)
                .await
                .with_context(|| format!("failed to export to {}", out.display()))?;
            println!(
                "Exported {} defects and {} teams to {}.",
                snapshot.defects.len(),
                snapshot.teams.len(),
                out.display()
            );
        }
        Commands::Kpi { scope } => {
            let snapshot = load(&scope, &settings).await?;
            let view = scope.view();
            let defects = view.apply(&snapshot.defects, now);
            let kpis = metrics::kpi_summary(&defects);
            let counts = metrics::dashboard_counts(&defects);

            println!("Defect KPIs ({}):", view.describe());
            println!("- Total: {}", kpis.total);
            println!("- Open: {} / closed: {}", counts.open, counts.closed);
            println!("- Critical: {}", kpis.critical);
            println!("- In progress: {}", kpis.in_progress);
            println!("- Blockers: {}", kpis.blockers);
            println!("- Recurring: {}", counts.recurring);
            println!("- Resolution rate: {}%", kpis.resolution_rate);
            println!("- Validation pass rate: {}%", kpis.validation_pass_rate);
            println!("Priority mix:");
            for entry in metrics::priority_distribution(&defects) {
                println!("- {}: {}", entry.name, entry.value);
            }
        }
        Commands::Distribution { scope, field } => {
            let snapshot = load(&scope, &settings).await?;
            let defects = scope.view().apply(&snapshot.defects, now);
            let entries = metrics::distribution_by(&defects, field, &Buckets::for_field(field));

            if entries.is_empty() {
                println!("No values recorded for this field.");
                return Ok(());
            }

            let counted: usize = entries.iter().map(|entry| entry.value).sum();
            println!("{counted} of {} defects have a value:", defects.len());
            for entry in entries {
                println!("- {}: {}", entry.name, entry.value);
            }
        }
        Commands::Teams { scope, limit } => {
            let snapshot = load(&scope, &settings).await?;
            let defects = scope.view().apply(&snapshot.defects, now);
            let stats = metrics::team_rollup(&defects, &snapshot.teams);

            if stats.is_empty() {
                println!("No teams found.");
                return Ok(());
            }

            println!("Teams by efficiency:");
            for stat in stats.iter().take(limit) {
                println!(
                    "- {} score {}% ({}% resolved, {}% validated) across {} defects, {} critical, {} requested",
                    stat.name,
                    stat.efficiency_score,
                    stat.resolution_rate,
                    stat.validation_success_rate,
                    stat.total_defects,
                    stat.critical_defects,
                    stat.requested_defects
                );
            }

            println!("Defects by VP:");
            for entry in metrics::vp_rollup(&defects, &snapshot.teams) {
                println!("- {}: {}", entry.name, entry.value);
            }

            let edges = metrics::collaboration_edges(&defects, settings.collaboration_limit);
            if !edges.is_empty() {
                println!("Cross-team requests:");
                for edge in edges {
                    println!("- {}: {}", edge.teams, edge.count);
                }
            }
        }
        Commands::Trends { scope, days } => {
            let snapshot = load(&scope, &settings).await?;
            let defects = scope.view().apply(&snapshot.defects, now);
            let days = days.unwrap_or(settings.trend_days);

            println!("Daily trend (last {days} days):");
            for point in metrics::daily_trend(&defects, days, now.date()) {
                println!(
                    "- {}: {} created, {} resolved, {} critical",
                    point.date, point.created, point.resolved, point.critical
                );
            }
        }
        Commands::Defects {
            scope,
            search,
            status,
            priority,
            severity,
            validation,
            team,
            project,
            limit,
        } => {
            let snapshot = load(&scope, &settings).await?;
            let scoped = scope.view().apply(&snapshot.defects, now);
            let query = DefectQuery {
                search,
                status,
                priority,
                team,
                project,
                severity,
                validation,
            };
            let matches = metrics::recent_defects(&query.apply(&scoped), limit);
            let counts = metrics::status_counts(&scoped);

            println!(
                "Status: {} total, {} open, {} in progress, {} resolved, {} closed, {} reopened",
                counts.all,
                counts.open,
                counts.in_progress,
                counts.resolved,
                counts.closed,
                counts.reopened
            );

            if matches.is_empty() {
                println!("No defects match these filters.");
                return Ok(());
            }

            for defect in matches {
                println!(
                    "- {} [{}] {} ({}, {})",
                    defect.issue_key,
                    defect.priority.map(|p| p.as_str()).unwrap_or("-"),
                    defect.summary,
                    defect.status.map(|s| s.as_str()).unwrap_or("-"),
                    defect.assigned_team.as_deref().unwrap_or("unassigned")
                );
            }
        }
        Commands::Report { scope, format, out } => {
            let snapshot = load(&scope, &settings).await?;
            let document =
                report::build_metrics_document(&scope.view(), &snapshot, &settings, now);
            let contents = match format {
                OutputFormat::Markdown => report::build_report(&document),
                OutputFormat::Json => serde_json::to_string_pretty(&document)?,
            };
            write_output(&out, contents)?;
        }
    }

    Ok(())
}
