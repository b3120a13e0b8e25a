//! Fetch a snapshot archive, land its payload, record it in the ledger.

use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use eventlake_core::{IngestError, LedgerEntry, SnapshotPointer};

use crate::fetch::Fetcher;
use crate::ledger::Ledger;

/// A payload extracted into the landing directory and recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandedSnapshot {
    pub identifier: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub entry: LedgerEntry,
}

pub struct Downloader {
    landing_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    ledger: Ledger,
}

impl Downloader {
    pub fn new(landing_dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>, ledger: Ledger) -> Self {
        Self {
            landing_dir: landing_dir.into(),
            fetcher,
            ledger,
        }
    }

    pub fn landing_dir(&self) -> &Path {
        &self.landing_dir
    }

    /// Where the payload for `identifier` lands.
    pub fn landed_path(&self, identifier: &str) -> PathBuf {
        self.landing_dir.join(identifier)
    }

    /// Download the archive behind `pointer`, extract the payload named after
    /// its identifier, then append the ledger entry.
    ///
    /// The ledger is only touched once the payload sits at its final path. If
    /// the append fails the landed payload is removed again, so a failed
    /// download leaves neither a file nor an entry behind.
    pub async fn download(&self, pointer: &SnapshotPointer) -> Result<LandedSnapshot, IngestError> {
        pointer.published_at()?;
        if pointer.identifier.contains(['/', '\\']) || pointer.identifier.starts_with('.') {
            return Err(IngestError::MalformedPointer(format!(
                "identifier '{}' is not a plain file name",
                pointer.identifier
            )));
        }

        let archive = self.fetcher.fetch(&pointer.fetch_url).await?;
        info!(
            identifier = %pointer.identifier,
            bytes = archive.len(),
            "archive downloaded"
        );

        let identifier = pointer.identifier.clone();
        let target = self.landed_path(&identifier);
        let landing_dir = self.landing_dir.clone();
        let ledger = self.ledger.clone();

        tokio::task::spawn_blocking(move || -> Result<LandedSnapshot, IngestError> {
            fs::create_dir_all(&landing_dir)?;
            let bytes = extract_payload(archive, &identifier, &target)?;

            let entry = match LedgerEntry::ingested_now(&identifier)
                .and_then(|entry| ledger.append(&entry).map(|()| entry))
            {
                Ok(entry) => entry,
                Err(e) => {
                    discard_landed(&target);
                    return Err(e);
                }
            };

            info!(identifier = %identifier, path = %target.display(), bytes, "snapshot landed");
            Ok(LandedSnapshot {
                identifier,
                path: target,
                bytes,
                entry,
            })
        })
        .await
        .map_err(|e| IngestError::Io(io::Error::other(format!("extraction task failed: {e}"))))?
    }
}

/// Extract the entry whose file name is `identifier` to `target` via a
/// `.part` sibling. Returns the number of bytes written.
fn extract_payload(archive: Bytes, identifier: &str, target: &Path) -> Result<u64, IngestError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| IngestError::MalformedArchive(format!("unreadable archive: {e}")))?;
    if zip.len() == 0 {
        return Err(IngestError::MalformedArchive("archive is empty".into()));
    }

    let index = (0..zip.len())
        .find(|&i| {
            zip.by_index_raw(i)
                .map(|f| !f.is_dir() && entry_file_name(f.name()) == identifier)
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            IngestError::MalformedArchive(format!("archive has no entry named '{identifier}'"))
        })?;

    let mut entry = zip
        .by_index(index)
        .map_err(|e| IngestError::MalformedArchive(format!("entry '{identifier}': {e}")))?;

    let part = part_path(target);
    let written = (|| -> Result<u64, IngestError> {
        let mut out = File::create(&part)?;
        let n = io::copy(&mut entry, &mut out).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                IngestError::MalformedArchive(format!("entry '{identifier}': {e}"))
            } else {
                IngestError::Io(e)
            }
        })?;
        out.sync_all()?;
        Ok(n)
    })();

    match written {
        Ok(n) => {
            fs::rename(&part, target)?;
            Ok(n)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&part) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %part.display(), error = %cleanup, "failed to remove partial payload");
                }
            }
            Err(e)
        }
    }
}

fn discard_landed(target: &Path) {
    if let Err(e) = fs::remove_file(target) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %target.display(), error = %e, "failed to remove landed payload");
        }
    }
}

fn entry_file_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
