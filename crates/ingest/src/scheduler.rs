//! Periodic driver for ingestion passes.
//!
//! One pass runs immediately at start, then one per tick of the configured
//! cadence. Passes never overlap: the next tick is only awaited once the
//! current pass has returned, and ticks that fell due in the meantime are
//! skipped rather than replayed.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::Notify;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use eventlake_core::config::ScheduleConfig;
use eventlake_core::IngestError;

use crate::pipeline::{PassOutcome, Pipeline};

/// When passes fire.
#[derive(Debug, Clone)]
pub enum Cadence {
    Interval(Duration),
    Cron(Schedule),
}

impl Cadence {
    /// A cron expression wins over the interval when both are configured.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, IngestError> {
        match &config.cron {
            Some(expr) => parse_cron(expr)
                .map(Cadence::Cron)
                .map_err(|e| IngestError::Config(format!("invalid cron expression '{expr}': {e}"))),
            None if config.interval_secs == 0 => {
                Err(IngestError::Config("interval must be at least one second".into()))
            }
            None => Ok(Cadence::Interval(Duration::from_secs(config.interval_secs))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Cadence::Interval(d) => format!("every {}s", d.as_secs()),
            Cadence::Cron(s) => format!("cron '{}'", s),
        }
    }
}

/// Parse a cron expression, auto-prepending "0 " for 5-field expressions.
///
/// The `cron` crate requires 6 fields (sec min hr dom mon dow), but users
/// typically write 5-field cron (min hr dom mon dow).
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() == 5 {
        let six_field = format!("0 {}", expr);
        Schedule::from_str(&six_field)
    } else {
        Schedule::from_str(expr)
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub passes: u64,
    pub ingested: u64,
    pub failures: u64,
}

enum Ticker {
    Interval(Interval),
    Cron(Schedule),
}

impl Ticker {
    fn new(cadence: &Cadence) -> Self {
        match cadence {
            Cadence::Interval(period) => {
                let mut interval = tokio::time::interval(*period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Ticker::Interval(interval)
            }
            Cadence::Cron(schedule) => Ticker::Cron(schedule.clone()),
        }
    }

    /// Wait for the next fire time. `false` once the schedule is exhausted.
    async fn tick(&mut self) -> bool {
        match self {
            Ticker::Interval(interval) => {
                interval.tick().await;
                true
            }
            Ticker::Cron(schedule) => {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    return false;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                true
            }
        }
    }
}

pub struct Scheduler {
    cadence: Cadence,
}

impl Scheduler {
    pub fn new(cadence: Cadence) -> Self {
        Self { cadence }
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    /// Run passes until `shutdown` is notified. A pass in flight is always
    /// allowed to finish; the notification is only observed between passes,
    /// so signal it with `notify_one` to keep the permit.
    pub async fn run(&self, pipeline: &Pipeline, shutdown: Arc<Notify>) -> SchedulerStats {
        info!(cadence = %self.cadence.describe(), "scheduler started");

        let mut ticker = Ticker::new(&self.cadence);
        let mut stats = SchedulerStats::default();

        // An interval's first tick completes immediately; consume it so the
        // eager pass below is not followed by a second one straight away.
        if let Ticker::Interval(interval) = &mut ticker {
            interval.tick().await;
        }

        loop {
            run_once(pipeline, &mut stats).await;

            tokio::select! {
                _ = shutdown.notified() => {
                    info!(passes = stats.passes, failures = stats.failures, "scheduler stopping");
                    break;
                }
                more = ticker.tick() => {
                    if !more {
                        warn!("schedule has no further fire times; stopping");
                        break;
                    }
                }
            }
        }
        stats
    }
}

async fn run_once(pipeline: &Pipeline, stats: &mut SchedulerStats) {
    stats.passes += 1;
    match pipeline.run_pass().await {
        Ok(PassOutcome::Ingested { identifier, rows_inserted, .. }) => {
            stats.ingested += 1;
            info!(identifier = %identifier, rows_inserted, "pass complete: ingested");
        }
        Ok(PassOutcome::UpToDate { identifier, .. }) => {
            info!(identifier = %identifier, "pass complete: up to date");
        }
        Err(e) => {
            stats.failures += 1;
            error!(kind = e.kind(), error = %e, "pass failed");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
