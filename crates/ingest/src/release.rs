//! Release detection: compare the remote pointer with the ledger.

use std::sync::Arc;

use tracing::{debug, info, warn};

use eventlake_core::{IngestError, SnapshotPointer};

use crate::fetch::Fetcher;
use crate::ledger::Ledger;

/// Polls the pointer resource advertising the latest snapshot.
pub struct ReleaseChecker {
    pointer_url: String,
    fetcher: Arc<dyn Fetcher>,
    ledger: Ledger,
}

impl ReleaseChecker {
    pub fn new(pointer_url: impl Into<String>, fetcher: Arc<dyn Fetcher>, ledger: Ledger) -> Self {
        Self {
            pointer_url: pointer_url.into(),
            fetcher,
            ledger,
        }
    }

    /// Returns `(has_new, pointer)` where `has_new` is true iff the advertised
    /// identifier differs from the last one in the ledger and was never
    /// ingested before. An empty ledger means anything advertised is new.
    pub async fn check_new_release(&self) -> Result<(bool, SnapshotPointer), IngestError> {
        let body = self.fetcher.fetch(&self.pointer_url).await?;
        let pointer = parse_pointer(&String::from_utf8_lossy(&body))?;

        let last = self.ledger.last_entry()?;
        let mut has_new = match &last {
            Some(entry) => entry.identifier != pointer.identifier,
            None => true,
        };
        if has_new && last.is_some() && self.ledger.contains(&pointer.identifier)? {
            warn!(
                identifier = %pointer.identifier,
                last = last.as_ref().map(|e| e.identifier.as_str()).unwrap_or("-"),
                "pointer advertises an already ingested snapshot; ignoring"
            );
            has_new = false;
        }

        if has_new {
            info!(
                identifier = %pointer.identifier,
                last = last.as_ref().map(|e| e.identifier.as_str()).unwrap_or("-"),
                "new snapshot available"
            );
        } else {
            debug!(identifier = %pointer.identifier, "already ingested");
        }
        Ok((has_new, pointer))
    }
}

/// Pointer bodies look like `<size> <checksum> <url>`; only the first line
/// matters and its last whitespace-separated field is the archive URL.
pub fn parse_pointer(body: &str) -> Result<SnapshotPointer, IngestError> {
    let line = body.lines().next().map(str::trim).unwrap_or("");
    if line.is_empty() {
        return Err(IngestError::MalformedPointer("pointer body is empty".into()));
    }
    let url = line
        .split_whitespace()
        .last()
        .filter(|field| field.contains("://"))
        .ok_or_else(|| IngestError::MalformedPointer(format!("no url in pointer line '{line}'")))?;
    SnapshotPointer::from_url(url)
}
