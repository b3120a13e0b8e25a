//! Append-only execution ledger.
//!
//! One line per ingested snapshot: `identifier \t published_epoch \t ingested_epoch \n`.
//! Lines written by the previous tool carry four fields
//! (`checksum \t identifier \t published \t ingested`) and are still readable.
//!
//! Identifiers are unique: an identifier already present is never appended
//! again, so a feed that rolls back to an older snapshot cannot re-record it.
//!
//! Only complete, newline-terminated lines count. A crash mid-append leaves
//! at most one unterminated fragment at the end of the file, which readers
//! ignore and the next append isolates behind a fresh newline.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use eventlake_core::{IngestError, LedgerEntry};

/// Size of the backwards read window used by [`Ledger::last_entry`].
const TAIL_CHUNK: u64 = 4096;

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// The file is created lazily on first append.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single newline-terminated write, then fsync.
    ///
    /// Fails with [`ErrorKind::AlreadyExists`] when the identifier is already
    /// recorded.
    pub fn append(&self, entry: &LedgerEntry) -> Result<(), IngestError> {
        if entry.identifier.is_empty() || entry.identifier.contains(['\t', '\n', '\r']) {
            return Err(IngestError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("identifier {:?} cannot be stored in the ledger", entry.identifier),
            )));
        }
        if self.contains(&entry.identifier)? {
            return Err(IngestError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("identifier {} is already in the ledger", entry.identifier),
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        let mut record = String::new();
        if ends_with_torn_fragment(&mut file)? {
            warn!(path = %self.path.display(), "ledger ends with an incomplete record; isolating it");
            record.push('\n');
        }
        record.push_str(&format_line(entry));

        file.write_all(record.as_bytes())?;
        file.sync_data()?;
        debug!(identifier = %entry.identifier, "ledger entry appended");
        Ok(())
    }

    /// The last complete entry in file order, or `None` for an absent/empty ledger.
    ///
    /// Reads backwards from the end in bounded chunks instead of scanning the file.
    pub fn last_entry(&self) -> Result<Option<LedgerEntry>, IngestError> {
        self.rfind(|_| true)
    }

    /// Whether a complete entry for `identifier` exists anywhere in the ledger.
    ///
    /// Newest entries are checked first, so a hit on a recent snapshot stops early.
    pub fn contains(&self, identifier: &str) -> Result<bool, IngestError> {
        Ok(self.rfind(|e| e.identifier == identifier)?.is_some())
    }

    /// Newest complete entry matching `pred`.
    fn rfind(&self, pred: impl Fn(&LedgerEntry) -> bool) -> Result<Option<LedgerEntry>, IngestError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut lines = ReverseLines::new(file)?;
        while let Some(raw) = lines.next_line()? {
            let line = String::from_utf8_lossy(&raw);
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(entry) if pred(&entry) => return Ok(Some(entry)),
                Some(_) => {}
                None => warn!(path = %self.path.display(), line = %line, "skipping unparsable ledger line"),
            }
        }
        Ok(None)
    }

    /// Every complete entry, oldest first.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, IngestError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut pieces: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
        // Whatever follows the final newline is empty or torn.
        pieces.pop();

        let mut entries = Vec::with_capacity(pieces.len());
        for raw in pieces {
            let line = String::from_utf8_lossy(raw);
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(entry) => entries.push(entry),
                None => warn!(path = %self.path.display(), line = %line, "skipping unparsable ledger line"),
            }
        }
        Ok(entries)
    }
}

fn ends_with_torn_fragment(file: &mut File) -> Result<bool, IngestError> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn format_line(entry: &LedgerEntry) -> String {
    format!(
        "{}\t{}\t{}\n",
        entry.identifier,
        entry.published_at.timestamp(),
        entry.ingested_at.timestamp()
    )
}

fn parse_line(line: &str) -> Option<LedgerEntry> {
    let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
    let (identifier, published, ingested) = match fields.as_slice() {
        [id, published, ingested] => (*id, *published, *ingested),
        [_checksum, id, published, ingested] => (*id, *published, *ingested),
        _ => return None,
    };
    if identifier.is_empty() {
        return None;
    }
    Some(LedgerEntry {
        identifier: identifier.to_string(),
        published_at: parse_epoch(published)?,
        ingested_at: parse_epoch(ingested)?,
    })
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(s.trim().parse::<i64>().ok()?, 0)
}

/// Yields newline-terminated lines from the end of a file towards its start.
///
/// `buf` always holds `file[pos..cut]` where `cut` is the start of the line
/// yielded last; after the first refill it ends with the terminator of the
/// next line to yield.
struct ReverseLines {
    file: File,
    pos: u64,
    buf: Vec<u8>,
}

impl ReverseLines {
    fn new(file: File) -> Result<Self, IngestError> {
        let pos = file.metadata()?.len();
        let mut lines = Self {
            file,
            pos,
            buf: Vec::new(),
        };
        lines.drop_torn_tail()?;
        Ok(lines)
    }

    /// Discard bytes after the final newline.
    fn drop_torn_tail(&mut self) -> Result<(), IngestError> {
        loop {
            if let Some(i) = self.buf.iter().rposition(|b| *b == b'\n') {
                self.buf.truncate(i + 1);
                return Ok(());
            }
            if self.pos == 0 {
                self.buf.clear();
                return Ok(());
            }
            self.refill()?;
        }
    }

    fn refill(&mut self) -> Result<(), IngestError> {
        let read_len = TAIL_CHUNK.min(self.pos);
        self.pos -= read_len;
        self.file.seek(SeekFrom::Start(self.pos))?;
        let mut chunk = vec![0u8; read_len as usize];
        self.file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&self.buf);
        self.buf = chunk;
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<Vec<u8>>, IngestError> {
        loop {
            if self.buf.is_empty() {
                return Ok(None);
            }
            let body_end = self.buf.len() - 1;
            if let Some(i) = self.buf[..body_end].iter().rposition(|b| *b == b'\n') {
                let line = self.buf[i + 1..body_end].to_vec();
                self.buf.truncate(i + 1);
                return Ok(Some(line));
            }
            if self.pos == 0 {
                let line = self.buf[..body_end].to_vec();
                self.buf.clear();
                return Ok(Some(line));
            }
            self.refill()?;
        }
    }
}
