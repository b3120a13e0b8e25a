use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Archive extensions stripped from the final URL segment to form the identifier.
const ARCHIVE_EXTENSIONS: &[&str] = &[".zip"];

/// Compact timestamp format leading every snapshot identifier.
const COMPACT_FORMAT: &str = "%Y%m%d%H%M%S";

/// A published snapshot as advertised by the remote pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPointer {
    /// e.g. `20210901003000.export.CSV`
    pub identifier: String,
    /// e.g. `http://host/20210901003000.export.CSV.zip`
    pub fetch_url: String,
}

impl SnapshotPointer {
    /// Derive the pointer from an archive URL.
    pub fn from_url(fetch_url: &str) -> Result<Self, IngestError> {
        let identifier = identifier_from_url(fetch_url).ok_or_else(|| {
            IngestError::MalformedPointer(format!("no archive name in url '{}'", fetch_url))
        })?;
        Ok(Self {
            identifier,
            fetch_url: fetch_url.to_string(),
        })
    }

    /// Publication time encoded in the identifier.
    pub fn published_at(&self) -> Result<DateTime<Utc>, IngestError> {
        published_at(&self.identifier)
    }
}

/// One successfully ingested snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub identifier: String,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Entry for `identifier` ingested now.
    pub fn ingested_now(identifier: &str) -> Result<Self, IngestError> {
        Ok(Self {
            identifier: identifier.to_string(),
            published_at: published_at(identifier)?,
            ingested_at: truncate_to_seconds(Utc::now()),
        })
    }
}

/// Final path segment of `url` with query/fragment and archive extension removed.
pub fn identifier_from_url(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let path = without_fragment.split('?').next().unwrap_or(without_fragment);
    let segment = path.rsplit('/').next()?.trim();
    if segment.is_empty() {
        return None;
    }
    let stem = ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| strip_suffix_ignore_case(segment, ext))
        .unwrap_or(segment);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    if s.is_char_boundary(split) && s[split..].eq_ignore_ascii_case(suffix) {
        Some(&s[..split])
    } else {
        None
    }
}

/// Parse the leading `YYYYMMDDHHMMSS` token of an identifier as UTC.
pub fn published_at(identifier: &str) -> Result<DateTime<Utc>, IngestError> {
    let token = identifier.split('.').next().unwrap_or(identifier);
    NaiveDateTime::parse_from_str(token, COMPACT_FORMAT)
        .map(|ndt| ndt.and_utc())
        .map_err(|e| {
            IngestError::MalformedPointer(format!(
                "identifier '{}' does not start with a {} timestamp: {}",
                identifier, COMPACT_FORMAT, e
            ))
        })
}

/// Ledger timestamps are stored with second precision.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}
