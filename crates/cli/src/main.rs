//! Command-line rechunking of chunked datasets.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use rechunk_core::{JobConfig, RechunkPlan, RechunkPlanner};
use rechunk_pipeline::{
    DEFAULT_STAGING_PREFIX, LocalExecutor, PieceStaging, RechunkReport, Rechunker,
};
use rechunk_storage::{ChunkSource, ChunkStore, open_chunk_store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rechunkctl")]
#[command(about = "Rewrite a chunked dataset under a new chunk layout")]
#[command(version)]
struct Cli {
    /// Job config file path
    #[arg(long, global = true, env = "RECHUNK_CONFIG", default_value = "rechunk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rechunk plan as JSON without reading chunk data
    Plan,
    /// Run the rechunk job and print its report
    Run {
        /// Maximum chunks in flight (overrides the config)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Print the destination template as JSON
    Template,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { config, command } = Cli::parse();
    let job = load_job_config(&config)?;

    match command {
        Commands::Plan => {
            let (_, plan) = prepare(&job).await?;
            println!("{}", serde_json::to_string_pretty(&plan.summary())?);
        }
        Commands::Run { concurrency } => {
            let report = run_job(&job, concurrency).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Template => {
            let (_, plan) = prepare(&job).await?;
            println!("{}", serde_json::to_string_pretty(&plan.template())?);
        }
    }
    Ok(())
}

/// Load a job config from `path`, with `RECHUNK_`-prefixed environment
/// overrides (nested keys separated by `__`).
fn load_job_config(path: &Path) -> Result<JobConfig> {
    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }

    let job: JobConfig = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("RECHUNK_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .with_context(|| format!("failed to load job config from {}", path.display()))?;

    job.validate()
        .map_err(|e| anyhow::anyhow!("invalid job config: {e}"))?;
    Ok(job)
}

/// Open the input store and plan the job against its template.
async fn prepare(job: &JobConfig) -> Result<(ChunkStore, RechunkPlan)> {
    let input = open_chunk_store(&job.input)
        .await
        .context("failed to open input store")?;
    let template = input
        .read_template()
        .await
        .context("failed to read input template")?;

    let config = job.rechunk_config(template.descriptor(), template.chunk_scheme());
    let plan = RechunkPlanner::new(config)
        .and_then(|planner| planner.plan())
        .and_then(|plan| plan.check_source_layout(&template).map(|()| plan))
        .context("failed to plan rechunk")?;
    Ok((input, plan))
}

async fn run_job(job: &JobConfig, concurrency: Option<usize>) -> Result<RechunkReport> {
    let (input, plan) = prepare(job).await?;
    let output = open_chunk_store(&job.output)
        .await
        .context("failed to open output store")?;
    let executor = LocalExecutor::new(concurrency.unwrap_or(job.concurrency));
    let staging = PieceStaging::new(output.object_store().clone(), DEFAULT_STAGING_PREFIX);
    info!(
        input = input.object_store().backend_name(),
        output = output.object_store().backend_name(),
        staging = staging.prefix(),
        concurrency = executor.concurrency(),
        "Running rechunk job"
    );

    Rechunker::new(plan, Arc::new(input), Arc::new(output))
        .with_staging(staging)
        .run(&executor)
        .await
        .context("rechunk failed")
}
