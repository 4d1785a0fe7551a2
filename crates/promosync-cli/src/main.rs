use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use promosync_sync::{Action, SyncConfig, SyncPipeline, TracingSink, WriteOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "promosync")]
#[command(about = "Copy promotions between commerce environments by natural keys")]
struct Cli {
    /// Environments file; defaults to ./promosync.yaml.
    #[arg(long, global = true, env = "PROMOSYNC_CONFIG")]
    config: Option<PathBuf>,
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a snapshot of the source environment's promotions.
    Export {
        #[arg(long)]
        from: String,
        #[arg(long)]
        out: PathBuf,
        /// Promotion names to keep; all when omitted.
        #[arg(long)]
        only: Vec<String>,
    },
    /// Show what an import would create or update.
    Plan {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        to: String,
    },
    /// Apply a snapshot to the target environment.
    Import {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        to: String,
        #[arg(long)]
        only: Vec<String>,
        /// Disable active target promotions whose source counterpart is inactive.
        #[arg(long)]
        disable_inactive: bool,
    },
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = SyncConfig::from_env();
    if let Some(path) = cli.config {
        config.config_path = path;
    }
    info!(config = %config.config_path.display(), "loading environments");
    let pipeline = SyncPipeline::new(config).await?;
    let mut sink = TracingSink;

    match cli.command {
        Commands::Export { from, out, only } => {
            let summary = pipeline.run_export(&from, &out, &only, &mut sink).await?;
            println!(
                "export complete: run_id={} promotions={} relationships={} types={} path={}",
                summary.run_id,
                summary.promotions,
                summary.relationships,
                summary.relationship_types.join(","),
                summary.path
            );
        }
        Commands::Plan { snapshot, to } => {
            let plan = pipeline.run_plan(&snapshot, &to, &mut sink).await?;
            for candidate in plan.ordered_for_review() {
                let updated_at = candidate
                    .source
                    .updated_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<7} {:<17} {}", candidate.action, updated_at, candidate.name());
            }
            println!(
                "plan complete: candidates={} create={} update={} excluded={}",
                plan.candidates.len(),
                plan.count(Action::Create),
                plan.count(Action::Update),
                plan.excluded
            );
        }
        Commands::Import {
            snapshot,
            to,
            only,
            disable_inactive,
        } => {
            let options = WriteOptions { disable_inactive };
            let summary = pipeline
                .run_import(&snapshot, &to, &only, options, &mut sink)
                .await?;
            println!(
                "import complete: run_id={} attempted={} created={} updated={} enabled={} failed={}",
                summary.run_id,
                summary.attempted,
                summary.created,
                summary.updated,
                summary.enabled,
                summary.failed
            );
            if summary.failed > 0 {
                bail!("{} promotion(s) failed to sync", summary.failed);
            }
        }
    }

    Ok(())
}
