//! The persisted dataset: one Parquet file replaced atomically on every merge.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use tracing::{debug, info, warn};

use eventlake_core::{IngestError, TableSchema};

use crate::dedup::merge_dedup;
use crate::schema::{arrow_schema, conform};

/// Footer key naming the increment merged most recently.
pub const LAST_IDENTIFIER_KEY: &str = "eventlake.last_identifier";
/// Footer key holding the row count at write time.
pub const ROW_COUNT_KEY: &str = "eventlake.row_count";

fn parquet_err(e: parquet::errors::ParquetError) -> IngestError {
    IngestError::Parquet(e.to_string())
}

/// Outcome of one read-merge-write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub previous_rows: usize,
    pub total_rows: usize,
    pub increment_rows: usize,
}

impl MergeStats {
    /// Net row-count change. Not the increment size: duplicates collapse.
    pub fn inserted(&self) -> i64 {
        self.total_rows as i64 - self.previous_rows as i64
    }
}

/// Handle on the dataset artifact at a fixed path.
pub struct DatasetStore {
    path: PathBuf,
    schema: SchemaRef,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>, schema: &TableSchema) -> Self {
        Self {
            path: path.into(),
            schema: arrow_schema(schema),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the whole dataset, or `None` when nothing has been persisted yet.
    pub fn load(&self) -> Result<Option<RecordBatch>, IngestError> {
        if !self.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(parquet_err)?
            .build()
            .map_err(parquet_err)?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| IngestError::Parquet(e.to_string()))?;
            batches.push(conform(batch, &self.schema)?);
        }
        let batch = concat_batches(&self.schema, &batches)
            .map_err(|e| IngestError::Parquet(e.to_string()))?;
        Ok(Some(batch))
    }

    /// Identifier recorded in the footer by the last successful persist.
    pub fn last_identifier(&self) -> Result<Option<String>, IngestError> {
        if !self.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let reader = SerializedFileReader::new(file).map_err(parquet_err)?;
        let value = reader
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .and_then(|kv| kv.iter().find(|kv| kv.key == LAST_IDENTIFIER_KEY))
            .and_then(|kv| kv.value.clone());
        Ok(value)
    }

    /// Merge `increment` into the persisted rows and replace the artifact.
    ///
    /// Nothing on disk changes unless the whole cycle succeeds.
    pub fn merge(&self, increment: &RecordBatch, identifier: &str) -> Result<MergeStats, IngestError> {
        let increment = conform(increment.clone(), &self.schema)?;
        let existing = self.load()?;
        let previous_rows = existing.as_ref().map(RecordBatch::num_rows).unwrap_or(0);

        let merged = merge_dedup(&self.schema, existing.as_ref(), &increment)?;
        self.persist(&merged, identifier)?;

        let stats = MergeStats {
            previous_rows,
            total_rows: merged.num_rows(),
            increment_rows: increment.num_rows(),
        };
        info!(
            identifier = %identifier,
            previous = stats.previous_rows,
            total = stats.total_rows,
            inserted = stats.inserted(),
            "dataset merged"
        );
        Ok(stats)
    }

    /// Write `batch` to a temp file next to the artifact, fsync it, then
    /// rename it over the artifact and fsync the directory.
    pub fn persist(&self, batch: &RecordBatch, identifier: &str) -> Result<(), IngestError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let tmp = temp_path(&self.path);
        if let Err(e) = self.write_file(&tmp, batch, identifier) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp dataset");
                }
            }
            return Err(e);
        }

        fs::rename(&tmp, &self.path)?;
        sync_dir(parent)?;

        debug!(
            path = %self.path.display(),
            rows = batch.num_rows(),
            identifier = %identifier,
            "wrote dataset"
        );
        Ok(())
    }

    fn write_file(&self, tmp: &Path, batch: &RecordBatch, identifier: &str) -> Result<(), IngestError> {
        let file = File::create(tmp)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(Default::default()))
            .set_key_value_metadata(Some(vec![
                parquet::format::KeyValue::new(
                    LAST_IDENTIFIER_KEY.to_string(),
                    Some(identifier.to_string()),
                ),
                parquet::format::KeyValue::new(
                    ROW_COUNT_KEY.to_string(),
                    Some(batch.num_rows().to_string()),
                ),
            ]))
            .build();

        let mut writer =
            ArrowWriter::try_new(file, self.schema.clone(), Some(props)).map_err(parquet_err)?;
        writer.write(batch).map_err(parquet_err)?;
        let file = writer.into_inner().map_err(parquet_err)?;
        file.sync_all()?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "dataset".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), IngestError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), IngestError> {
    Ok(())
}
