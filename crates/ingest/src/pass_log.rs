//! JSON-lines history of scheduler passes.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// One line of the pass log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRecord {
    pub pass_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// `up_to_date`, `ingested` or `failed`.
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_inserted: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PassLog {
    path: PathBuf,
}

impl PassLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` as one JSON line. Failures are logged, never returned:
    /// the pass log is a diagnostic aid, not part of the ingestion state.
    pub fn append(&self, record: &PassRecord) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "failed to create pass log directory");
                return;
            }
        }

        let json_line = match serde_json::to_string(record) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize pass record");
                return;
            }
        };

        let mut file = match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "failed to open pass log");
                return;
            }
        };

        if let Err(e) = writeln!(file, "{}", json_line) {
            warn!(error = %e, "failed to write pass record");
        }
    }
}
