//! ingest-worker: keeps the event dataset in step with the upstream feed.
//!
//! Polls the feed pointer on a fixed interval or cron schedule, lands each new
//! snapshot, records it in the execution ledger, and merges it into the
//! Parquet dataset.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use eventlake_core::config::{self, Config};
use eventlake_ingest::{Cadence, PassOutcome, Pipeline, Scheduler};

// ── CLI ─────────────────────────────────────────────────────────────

/// Incremental snapshot ingestion worker.
#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    /// Configuration profile (keys resolve as `{PROFILE}_{KEY}` first).
    #[arg(long, env = "EVENTLAKE_PROFILE")]
    profile: Option<String>,

    /// Run a single pass and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between passes (overrides INGEST_INTERVAL_SECS).
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Cron expression, 5 or 6 fields (overrides INGEST_CRON).
    #[arg(long)]
    cron: Option<String>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match cli.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(secs) = cli.interval_secs {
        config.schedule.interval_secs = secs;
        config.schedule.cron = None;
    }
    if let Some(expr) = cli.cron {
        config.schedule.cron = Some(expr);
    }

    config.validate()?;
    config.log_summary();

    let pipeline = Pipeline::from_config(&config)?;

    if cli.once {
        let outcome = pipeline.run_pass().await?;
        match &outcome {
            PassOutcome::Ingested { identifier, rows_inserted, .. } => {
                info!(identifier = %identifier, rows_inserted, "ingested")
            }
            PassOutcome::UpToDate { identifier, .. } => {
                info!(identifier = %identifier, "already up to date")
            }
        }
        return Ok(());
    }

    let scheduler = Scheduler::new(Cadence::from_config(&config.schedule)?);

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, finishing current pass");
        signal.notify_one();
    });

    let stats = scheduler.run(&pipeline, shutdown).await;
    info!(
        passes = stats.passes,
        ingested = stats.ingested,
        failures = stats.failures,
        "ingest-worker stopped"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
