//! Command-line front end for the report converter.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use debrief::{Config, Exporter, Orchestrator};

#[derive(Debug, Parser)]
#[command(
    name = "debrief",
    version,
    about = "Convert session report logs into replay timelines and ORBAT charts"
)]
struct Cli {
    /// Configuration file with the source and destination directories.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Session identifier to leave out of the conversion. Repeatable.
    #[arg(long = "exclude", value_name = "SESSION_ID")]
    exclude: Vec<String>,

    /// Only list the discovered sessions, convert nothing.
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let orchestrator = Orchestrator::new(config.resolve_staging_dir());

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cleaning up");
            cancel.cancel();
        }
    });

    if cli.list {
        let scan = orchestrator.scan(&config.report_dir).await?;
        println!("Discovered sessions for {}:", scan.date);
        for (idx, discovered) in scan.sessions.iter().enumerate() {
            println!("{}) {}", idx + 1, discovered.session.describe());
        }
        for orbat in &scan.orbats {
            println!("   org chart: {}", orbat.mission);
        }
        // Dropping the scan outcome removes the staging files.
        return Ok(());
    }

    let excluded = cli.exclude;
    let outcome = orchestrator
        .run(&config.report_dir, |scan| {
            for id in &excluded {
                if !scan.exclude_session(id) {
                    warn!("--exclude {id}: no such session");
                }
            }
        })
        .await?;

    let summary = Exporter::new(&config).export_all(&outcome)?;

    for failure in &outcome.failures {
        eprintln!("session '{}' failed: {}", failure.session_id, failure.error);
    }
    println!(
        "Converted {} session(s) dated {}; {} org chart(s).",
        outcome.timelines.len(),
        outcome.date,
        outcome.orbats.len()
    );
    for path in &summary.replays {
        println!("  {}", path.display());
    }
    println!("  {}", summary.orbat.display());
    println!("  {}", summary.leaders.display());
    println!("  {}", summary.list.display());

    Ok(())
}
