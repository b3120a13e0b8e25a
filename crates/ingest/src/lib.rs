//! Incremental snapshot ingestion.
//!
//! A pass asks the remote pointer for the latest snapshot, compares it with
//! the execution ledger, downloads and lands anything new, and folds it into
//! the Parquet dataset. [`scheduler::Scheduler`] repeats passes on a cadence.

pub mod download;
pub mod fetch;
pub mod ledger;
pub mod merger;
pub mod pass_log;
pub mod pipeline;
pub mod release;
pub mod scheduler;

pub use download::{Downloader, LandedSnapshot};
pub use fetch::{Fetcher, HttpFetcher};
pub use ledger::Ledger;
pub use merger::Merger;
pub use pass_log::{PassLog, PassRecord};
pub use pipeline::{PassOutcome, Pipeline};
pub use release::ReleaseChecker;
pub use scheduler::{Cadence, Scheduler, SchedulerStats};
