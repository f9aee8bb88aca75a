use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use review_harvest::pager::{FilePager, HttpPager, SourcePager};
use review_harvest::pipeline::CompletedRun;
use review_harvest::{db, export, AggregateExporter, CollectionTarget, RunRequest, Settings};

#[derive(Parser)]
#[command(name = "review_harvest", about = "Bulk review collection with CSV export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect reviews for one or more targets and export them to CSV
    Run {
        /// JSON run request ({targets, requestedCountPerTarget, filterThreshold?})
        #[arg(long, conflicts_with_all = ["targets", "count", "threshold"])]
        request: Option<PathBuf>,
        /// Target as <id> or <id>:<display name>; repeatable
        #[arg(short = 't', long = "target")]
        targets: Vec<String>,
        /// Reviews wanted per target
        #[arg(short = 'n', long)]
        count: Option<i64>,
        /// Max fraction of non-alphanumeric characters (0..=1)
        #[arg(long)]
        threshold: Option<f64>,
        /// Read records from a JSON file instead of the network
        #[arg(long)]
        source_file: Option<PathBuf>,
        /// Skip recording the run in the ledger
        #[arg(long)]
        no_ledger: bool,
    },
    /// Re-read an export and show its first rows
    Inspect {
        file: PathBuf,
        /// Rows to display
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },
    /// Show recent runs from the ledger
    History {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;

    let result = match cli.command {
        Commands::Run {
            request,
            targets,
            count,
            threshold,
            source_file,
            no_ledger,
        } => {
            let request = match request {
                Some(path) => read_request(&path)?,
                None => RunRequest {
                    targets: Some(parse_targets(&targets)?),
                    requested_count_per_target: count,
                    filter_threshold: threshold,
                },
            };

            let mut pager: Box<dyn SourcePager> = match source_file {
                Some(path) => Box::new(FilePager::load(&path)?),
                None => Box::new(HttpPager::steam(&settings)?),
            };

            let done = collect(&request, pager.as_mut(), &settings).await?;
            if !no_ledger {
                record_in_ledger(&settings.ledger_path, &done);
            }
            println!("{}", serde_json::to_string_pretty(&done.summary)?);
            Ok(())
        }
        Commands::Inspect { file, limit } => {
            let rows = export::read_export(&file)
                .with_context(|| format!("Failed to read export {}", file.display()))?;
            println!("{} rows in {}", rows.len(), file.display());
            println!(
                "{:<20} | {:>5} | {:>6} | {:<20} | {}",
                "Target", "Rec", "Hours", "Posted", "Text"
            );
            println!("{}", "-".repeat(100));
            for r in rows.iter().take(limit) {
                println!(
                    "{:<20} | {:>5} | {:>6.1} | {:<20} | {}",
                    truncate(&r.target_name, 20),
                    if r.recommended { "yes" } else { "no" },
                    r.hours_played,
                    r.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                    truncate(&r.text.replace('\n', " "), 40)
                );
            }
            Ok(())
        }
        Commands::History { limit } => {
            let conn = db::connect(&settings.ledger_path)?;
            db::init_schema(&conn)?;
            let runs = db::fetch_recent_runs(&conn, limit)?;
            if runs.is_empty() {
                println!("No runs recorded yet.");
                return Ok(());
            }
            println!(
                "{:>4} | {:<25} | {:>7} | {:>8} | {:>7} | {:>5} | {:>6} | {}",
                "#", "Finished", "Targets", "Accepted", "Quality", "Dupes", "Failed", "Export"
            );
            println!("{}", "-".repeat(110));
            for r in &runs {
                println!(
                    "{:>4} | {:<25} | {:>7} | {:>8} | {:>7} | {:>5} | {:>6} | {}",
                    r.id,
                    truncate(&r.finished_at, 25),
                    r.targets,
                    r.total_accepted,
                    r.skipped_quality,
                    r.skipped_dupes,
                    r.failed_targets,
                    r.export_path
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn collect(
    request: &RunRequest,
    pager: &mut dyn SourcePager,
    settings: &Settings,
) -> anyhow::Result<CompletedRun> {
    let exporter = AggregateExporter::new(&settings.output_dir);
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    let done = review_harvest::run(request, pager, settings, &exporter, &pb).await?;
    Ok(done)
}

fn read_request(path: &Path) -> anyhow::Result<RunRequest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run request {}", path.display()))?;
    Ok(RunRequest::from_json(&json)?)
}

/// `<id>` or `<id>:<display name>`; the id doubles as name when none is given.
fn parse_targets(raw: &[String]) -> anyhow::Result<Vec<CollectionTarget>> {
    raw.iter()
        .map(|s| {
            let (id, name) = match s.split_once(':') {
                Some((id, name)) => (id.trim(), name.trim()),
                None => (s.trim(), s.trim()),
            };
            if id.is_empty() {
                bail!("Empty target id in {:?}", s);
            }
            let name = if name.is_empty() { id } else { name };
            Ok(CollectionTarget::new(id, name))
        })
        .collect()
}

fn record_in_ledger(path: &Path, done: &CompletedRun) {
    let result = db::connect(path).and_then(|conn| {
        db::init_schema(&conn)?;
        db::record_run(&conn, &done.ledger_row())
    });
    if let Err(e) = result {
        warn!("Run finished but could not be recorded in {}: {}", path.display(), e);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
