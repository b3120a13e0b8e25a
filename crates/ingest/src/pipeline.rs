//! One ingestion pass: reconcile, check, download, merge.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use eventlake_core::{Config, IngestError, TableSchema};
use eventlake_dataset::DatasetStore;

use crate::download::Downloader;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::ledger::Ledger;
use crate::merger::Merger;
use crate::pass_log::{PassLog, PassRecord};
use crate::release::ReleaseChecker;

/// Result of a pass that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The advertised snapshot is already in the ledger.
    UpToDate {
        identifier: String,
        reconciled: Option<String>,
    },
    /// A new snapshot was downloaded and merged.
    Ingested {
        identifier: String,
        rows_inserted: i64,
        reconciled: Option<String>,
    },
}

impl PassOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            PassOutcome::UpToDate { .. } => "up_to_date",
            PassOutcome::Ingested { .. } => "ingested",
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            PassOutcome::UpToDate { identifier, .. } | PassOutcome::Ingested { identifier, .. } => {
                identifier
            }
        }
    }

    /// Identifier re-merged by reconciliation at the start of the pass.
    pub fn reconciled(&self) -> Option<&str> {
        match self {
            PassOutcome::UpToDate { reconciled, .. } | PassOutcome::Ingested { reconciled, .. } => {
                reconciled.as_deref()
            }
        }
    }
}

pub struct Pipeline {
    ledger: Ledger,
    checker: ReleaseChecker,
    downloader: Downloader,
    merger: Arc<Merger>,
    pass_log: PassLog,
}

impl Pipeline {
    pub fn new(
        ledger: Ledger,
        checker: ReleaseChecker,
        downloader: Downloader,
        merger: Merger,
        pass_log: PassLog,
    ) -> Self {
        Self {
            ledger,
            checker,
            downloader,
            merger: Arc::new(merger),
            pass_log,
        }
    }

    /// Wire every component from `config`, talking to the feed over HTTP.
    pub fn from_config(config: &Config) -> Result<Self, IngestError> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.feed.timeout())?);
        Self::with_fetcher(config, fetcher)
    }

    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn Fetcher>) -> Result<Self, IngestError> {
        let schema = match &config.storage.columns_file {
            Some(path) => TableSchema::from_names_file(path)?,
            None => TableSchema::default(),
        };
        let storage = &config.storage;
        let ledger = Ledger::open(&storage.ledger_path);
        let store = DatasetStore::new(storage.dataset_path(), &schema);

        Ok(Self::new(
            ledger.clone(),
            ReleaseChecker::new(&config.feed.pointer_url, fetcher.clone(), ledger.clone()),
            Downloader::new(&storage.landing_dir, fetcher, ledger),
            Merger::new(&storage.landing_dir, store),
            PassLog::new(&storage.pass_log_path),
        ))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn merger(&self) -> &Merger {
        &self.merger
    }

    /// Run one pass and record it in the pass log, whatever the outcome.
    pub async fn run_pass(&self) -> Result<PassOutcome, IngestError> {
        let pass_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let result = self.execute().await;

        let mut record = PassRecord {
            pass_id,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            outcome: "failed".to_string(),
            identifier: None,
            rows_inserted: None,
            reconciled: None,
            error_kind: None,
            error: None,
        };
        match &result {
            Ok(outcome) => {
                record.outcome = outcome.kind().to_string();
                record.identifier = Some(outcome.identifier().to_string());
                record.reconciled = outcome.reconciled().map(String::from);
                if let PassOutcome::Ingested { rows_inserted, .. } = outcome {
                    record.rows_inserted = Some(*rows_inserted);
                }
            }
            Err(e) => {
                record.error_kind = Some(e.kind().to_string());
                record.error = Some(e.to_string());
            }
        }
        self.pass_log.append(&record);

        result
    }

    async fn execute(&self) -> Result<PassOutcome, IngestError> {
        // A failed reconciliation must not block newer snapshots.
        let reconciled = match self.reconcile().await {
            Ok(r) => r,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "reconciliation failed; continuing with release check");
                None
            }
        };

        let (has_new, pointer) = self.checker.check_new_release().await?;
        if !has_new {
            return Ok(PassOutcome::UpToDate {
                identifier: pointer.identifier,
                reconciled,
            });
        }

        let landed = self.downloader.download(&pointer).await?;
        let rows_inserted = self.merge(&landed.identifier).await?;

        Ok(PassOutcome::Ingested {
            identifier: landed.identifier,
            rows_inserted,
            reconciled,
        })
    }

    /// Re-merge the last ledgered snapshot when the dataset does not record it.
    ///
    /// Covers a crash between the ledger append and the dataset replace.
    async fn reconcile(&self) -> Result<Option<String>, IngestError> {
        let Some(last) = self.ledger.last_entry()? else {
            return Ok(None);
        };
        let recorded = self.merger.store().last_identifier()?;
        if recorded.as_deref() == Some(last.identifier.as_str()) {
            return Ok(None);
        }

        let landed = self.merger.landed_path(&last.identifier);
        if !landed.is_file() {
            warn!(
                identifier = %last.identifier,
                dataset = recorded.as_deref().unwrap_or("-"),
                path = %landed.display(),
                "dataset is behind the ledger but the landed file is gone; skipping reconciliation"
            );
            return Ok(None);
        }

        warn!(
            identifier = %last.identifier,
            dataset = recorded.as_deref().unwrap_or("-"),
            "dataset is behind the ledger; re-merging last snapshot"
        );
        let inserted = self.merge(&last.identifier).await?;
        info!(identifier = %last.identifier, inserted, "reconciled");
        Ok(Some(last.identifier))
    }

    async fn merge(&self, identifier: &str) -> Result<i64, IngestError> {
        let merger = self.merger.clone();
        let identifier = identifier.to_string();
        tokio::task::spawn_blocking(move || merger.merge_increment(&identifier))
            .await
            .map_err(|e| IngestError::Io(std::io::Error::other(format!("merge task failed: {e}"))))?
    }
}
