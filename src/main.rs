use anyhow::Result;
use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use storesync::config;
use storesync::db;
use storesync::feed::FeedClient;
use storesync::jobs::{enqueue_job, JobKind, JobParams, JobRunner};
use storesync::platform::PlatformClient;
use storesync::settings::{CachedSettings, ConfigSettings};

/// Settings read through the cache go stale after this long.
const SETTINGS_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the sync worker, draining the job queue until stopped.
    Worker,
    /// Enqueue an order sync.
    SyncOrders {
        /// Lower bound on order creation time (e.g. 2026-01-01T00:00:00).
        /// Defaults to one day ago.
        #[arg(long)]
        from: Option<String>,
        /// Semicolon-separated platform status ids to restrict the pull.
        #[arg(long)]
        status_ids: Option<String>,
    },
    /// Enqueue a full catalog sync from the XML feed.
    SyncProductsFull,
    /// Enqueue a partial (availability) catalog sync.
    SyncProductsPartial,
    /// Enqueue a simple-products API sync.
    SyncProductsSimple {
        /// Semicolon-separated product codes to restrict the pull.
        #[arg(long)]
        codes: Option<String>,
    },
    /// Enqueue a stock adjustment batch run.
    ProcessStockAdjustments,
    /// Print an example configuration file and exit.
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/storesync.db", cfg.app.data_dir));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::ExampleConfig => unreachable!(),
        Command::Worker => {
            let settings = CachedSettings::new(ConfigSettings::new(cfg.clone()), SETTINGS_TTL);
            let api = PlatformClient::from_settings(&settings)?;
            let feeds = FeedClient::from_settings(&settings)?;
            let runner = JobRunner::new(
                &pool,
                &api,
                &feeds,
                ChronoDuration::minutes(cfg.app.stale_processing_minutes),
                cfg.app.max_backoff_seconds,
            );
            let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);

            info!("starting sync worker");
            loop {
                match runner.process_next().await {
                    Ok(processed) => {
                        if !processed {
                            tokio::time::sleep(poll_sleep).await;
                        }
                    }
                    Err(err) => {
                        error!(?err, "worker error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
        Command::SyncOrders { from, status_ids } => {
            let id = enqueue_job(
                &pool,
                JobKind::SyncOrders,
                &JobParams {
                    from,
                    status_ids,
                    ..Default::default()
                },
            )
            .await?;
            println!("accepted job #{id}");
        }
        Command::SyncProductsFull => {
            let id = enqueue_job(&pool, JobKind::SyncProductsFull, &JobParams::default()).await?;
            println!("accepted job #{id}");
        }
        Command::SyncProductsPartial => {
            let id =
                enqueue_job(&pool, JobKind::SyncProductsPartial, &JobParams::default()).await?;
            println!("accepted job #{id}");
        }
        Command::SyncProductsSimple { codes } => {
            let id = enqueue_job(
                &pool,
                JobKind::SyncProductsSimple,
                &JobParams {
                    codes,
                    ..Default::default()
                },
            )
            .await?;
            println!("accepted job #{id}");
        }
        Command::ProcessStockAdjustments => {
            let id = enqueue_job(
                &pool,
                JobKind::ProcessStockAdjustments,
                &JobParams::default(),
            )
            .await?;
            println!("accepted job #{id}");
        }
    }

    Ok(())
}
