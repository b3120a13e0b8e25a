use thiserror::Error;

/// Everything that can abort an ingestion pass.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Remote pointer or archive fetch failed (transport error or non-2xx).
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    /// The pointer resource did not contain a usable snapshot reference.
    #[error("malformed pointer: {0}")]
    MalformedPointer(String),

    /// The archive could not be read or lacks the expected payload.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// A row (or the persisted dataset) disagrees with the canonical column count.
    #[error("schema mismatch at line {line}: expected {expected} fields, found {found}")]
    SchemaMismatch {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(String),

    #[error("config error: {0}")]
    Config(String),
}

impl IngestError {
    /// Stable short name for logs and the pass log.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Network { .. } => "network",
            IngestError::MalformedPointer(_) => "malformed_pointer",
            IngestError::MalformedArchive(_) => "malformed_archive",
            IngestError::SchemaMismatch { .. } => "schema_mismatch",
            IngestError::Io(_) => "io",
            IngestError::Parquet(_) => "parquet",
            IngestError::Config(_) => "config",
        }
    }

    pub fn network(url: &str, reason: impl ToString) -> Self {
        IngestError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
